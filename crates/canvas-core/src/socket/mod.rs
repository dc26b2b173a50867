//! Realtime client - socket.io transport adapter and workspace subscriptions.

mod client;
mod coalesce;
mod transport;
mod ws;

pub use client::{
    AckResponse, ConnectionState, SubscriptionId, TreeCallback, TreeDelivery, WebSocketClient,
    WorkspaceUpdateEvent, TREE_GET_EVENT, TREE_UPDATED_EVENT,
};
pub use coalesce::UpdateDeduper;
pub use transport::{AckReceiver, Connection, Connector, Transport, TransportEvent};
pub use ws::WsConnector;
