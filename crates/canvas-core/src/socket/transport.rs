//! Transport seam between the subscription client and the wire.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

/// Resolves with the acknowledgement arguments; dropped if the connection goes away.
pub type AckReceiver = oneshot::Receiver<Vec<Value>>;

/// Lifecycle and server pushes observed on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    /// The library re-established the link after a drop
    Reconnected,
    Disconnected { reason: String },
    Event { name: String, args: Vec<Value> },
}

/// An established realtime connection.
pub trait Transport: Send + Sync {
    /// Queue an event expecting an acknowledgement. Frames leave in call order.
    fn emit(&self, event: &str, args: Vec<Value>) -> Result<AckReceiver>;

    fn is_connected(&self) -> bool;

    /// Close the connection and stop reconnecting.
    fn disconnect(&self);
}

pub struct Connection {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens authenticated connections to a server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, server_url: &str, auth: Value) -> Result<Connection>;
}
