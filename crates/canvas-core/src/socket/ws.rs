//! socket.io connection over `rust_socketio`.
//!
//! The library owns framing, heartbeats and reconnection; this adapter maps
//! its callbacks onto [`TransportEvent`]s and serializes emits through one
//! task so frames leave in call order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use rust_socketio::asynchronous::{Client as SocketClient, ClientBuilder};
use rust_socketio::{Event, Payload};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use super::transport::{AckReceiver, Connection, Connector, Transport, TransportEvent};
use crate::error::{ClientError, Result};
use crate::settings::SocketSettings;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Opens socket.io connections with reconnection per [`SocketSettings`].
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    settings: SocketSettings,
}

impl WsConnector {
    pub fn new(settings: SocketSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, server_url: &str, auth: Value) -> Result<Connection> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let link = Arc::new(Link {
            connected: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            ready: Mutex::new(Some(ready_tx)),
            events: events_tx,
        });

        let client = ClientBuilder::new(server_url)
            .namespace("/")
            .auth(auth)
            .reconnect(true)
            .reconnect_on_disconnect(true)
            .max_reconnect_attempts(self.settings.max_reconnect_attempts())
            .reconnect_delay(
                self.settings.reconnection_delay_ms,
                self.settings.reconnection_delay_max_ms,
            )
            .on(Event::Connect, {
                let link = link.clone();
                move |_: Payload, _: SocketClient| {
                    let link = link.clone();
                    async move { link.on_connect() }.boxed()
                }
            })
            .on(Event::Close, {
                let link = link.clone();
                move |_: Payload, _: SocketClient| {
                    let link = link.clone();
                    async move { link.on_close() }.boxed()
                }
            })
            .on(Event::Error, {
                let link = link.clone();
                move |payload: Payload, _: SocketClient| {
                    let link = link.clone();
                    async move { link.on_error(payload_text(payload)) }.boxed()
                }
            })
            .on_any({
                let link = link.clone();
                move |event: Event, payload: Payload, _: SocketClient| {
                    let link = link.clone();
                    async move { link.on_event(event, payload) }.boxed()
                }
            })
            .connect()
            .await?;

        let outcome = match timeout(self.settings.connect_timeout(), ready_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::Network(
                "connection closed during handshake".to_string(),
            )),
            Err(_) => Err(ClientError::Timeout("socket.io connect".to_string())),
        };
        if let Err(e) = outcome {
            let _ = client.disconnect().await;
            return Err(e);
        }
        tracing::info!(server = %server_url, "Socket connected");

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(client, commands_rx, self.settings.ack_timeout()));

        Ok(Connection {
            transport: Arc::new(SocketIoTransport {
                link,
                commands: commands_tx,
            }),
            events: events_rx,
        })
    }
}

/// Connection state shared between library callbacks and the transport.
struct Link {
    connected: AtomicBool,
    ever_connected: AtomicBool,
    ready: Mutex<Option<oneshot::Sender<Result<()>>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Link {
    fn on_connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        if let Some(ready) = lock(&self.ready).take() {
            let _ = ready.send(Ok(()));
        }
        let event = if self.ever_connected.swap(true, Ordering::SeqCst) {
            tracing::info!("Socket reconnected");
            TransportEvent::Reconnected
        } else {
            TransportEvent::Connected
        };
        let _ = self.events.send(event);
    }

    fn on_close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Disconnected {
            reason: "io server disconnect".to_string(),
        });
    }

    fn on_error(&self, message: String) {
        match lock(&self.ready).take() {
            Some(ready) => {
                let _ = ready.send(Err(connect_error(&message)));
            }
            None => tracing::warn!(error = %message, "Socket error"),
        }
    }

    fn on_event(&self, event: Event, payload: Payload) {
        let name = match event {
            Event::Custom(name) => name,
            Event::Message => "message".to_string(),
            _ => return,
        };
        match payload_args(payload) {
            Some(args) => {
                let _ = self.events.send(TransportEvent::Event { name, args });
            }
            None => tracing::debug!(event = %name, "Ignoring binary socket event"),
        }
    }
}

enum Command {
    Emit {
        event: String,
        args: Vec<Value>,
        ack: oneshot::Sender<Vec<Value>>,
    },
    Close,
}

struct SocketIoTransport {
    link: Arc<Link>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Transport for SocketIoTransport {
    fn emit(&self, event: &str, args: Vec<Value>) -> Result<AckReceiver> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let (ack, rx) = oneshot::channel();
        let command = Command::Emit {
            event: event.to_string(),
            args,
            ack,
        };
        self.commands
            .send(command)
            .map_err(|_| ClientError::NotConnected)?;
        Ok(rx)
    }

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        self.link.connected.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Close);
    }
}

/// Sends queued emits one at a time; acks resolve through their callbacks.
async fn drive(
    client: SocketClient,
    mut commands: mpsc::UnboundedReceiver<Command>,
    ack_timeout: Duration,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Emit { event, args, ack } => {
                // Dropped unanswered when the library times the ack out
                let slot = Arc::new(Mutex::new(Some(ack)));
                let on_ack = move |payload: Payload, _: SocketClient| {
                    let sender = lock(&slot).take();
                    async move {
                        if let Some(sender) = sender {
                            let _ = sender.send(payload_args(payload).unwrap_or_default());
                        }
                    }
                    .boxed()
                };
                let sent = client
                    .emit_with_ack(event.as_str(), Payload::Text(args), ack_timeout, on_ack)
                    .await;
                if let Err(e) = sent {
                    tracing::warn!(event = %event, error = %e, "Emit failed");
                }
            }
            Command::Close => {
                if let Err(e) = client.disconnect().await {
                    tracing::debug!(error = %e, "Socket close failed");
                }
                break;
            }
        }
    }
    tracing::debug!("Socket emit loop stopped");
}

/// JSON arguments of a payload; `None` for binary payloads.
fn payload_args(payload: Payload) -> Option<Vec<Value>> {
    match payload {
        Payload::Text(values) => Some(values),
        Payload::Binary(_) => None,
        _ => Some(Vec::new()),
    }
}

fn payload_text(payload: Payload) -> String {
    match payload_args(payload) {
        Some(values) => values
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(" "),
        None => "binary error payload".to_string(),
    }
}

/// Server middleware rejections mentioning authentication are auth failures.
fn connect_error(message: &str) -> ClientError {
    if message.to_lowercase().contains("auth") {
        ClientError::Auth(message.to_string())
    } else {
        ClientError::Network(format!("connect_error: {}", message))
    }
}
