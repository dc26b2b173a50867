//! Workspace subscriptions over the realtime connection.
//!
//! One transport at a time. Tree pushes are deduplicated and debounced per
//! workspace before reaching subscribers; acknowledgements are awaited on
//! spawned tasks so callers never block on the server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};

use super::coalesce::UpdateDeduper;
use super::transport::{AckReceiver, Connector, Transport, TransportEvent};
use crate::api::parse_tree_payload;
use crate::config::{default_config_dir, token_preview, ConfigBridge, APP_ID};
use crate::error::{ClientError, Result};
use crate::settings::{SocketSettings, UpdateSettings};
use crate::tree::{prepare_for_ui, TicketSource, TreeNode};

pub const SUBSCRIBE_EVENT: &str = "workspace:subscribe";
pub const UNSUBSCRIBE_EVENT: &str = "workspace:unsubscribe";
pub const TREE_GET_EVENT: &str = "workspace:tree:get";
pub const TREE_UPDATED_EVENT: &str = "workspace:workspace:tree:updated";
const PING_EVENT: &str = "ping";

/// A tree for subscribers, stamped with the ticket taken when it was requested
/// or, for pushes, when it arrived.
#[derive(Debug, Clone)]
pub struct TreeDelivery {
    pub ticket: u64,
    pub tree: TreeNode,
}

pub type TreeCallback = Arc<dyn Fn(TreeDelivery) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Acknowledgement body for client emits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// `ping` replies with `{success, timestamp}`
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl AckResponse {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success") || self.success == Some(true)
    }

    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

/// `workspace:workspace:tree:updated` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceUpdateEvent {
    pub workspace_id: String,
    pub data: WorkspaceUpdate,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceUpdate {
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub path_from: Option<String>,
    #[serde(default)]
    pub path_to: Option<String>,
    #[serde(default)]
    pub tree: Option<Value>,
}

/// Socket client shared by the app and the browser. Cheap to clone.
#[derive(Clone)]
pub struct WebSocketClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<ConfigBridge>,
    connector: Arc<dyn Connector>,
    socket: SocketSettings,
    tickets: TicketSource,
    debounce: Duration,
    state: watch::Sender<ConnectionState>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    subscriptions: Mutex<HashMap<String, Vec<(SubscriptionId, TreeCallback)>>>,
    next_subscription: AtomicU64,
    dedupe: Mutex<UpdateDeduper>,
    timers: Mutex<HashMap<String, (u64, JoinHandle<()>)>>,
    next_timer: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl WebSocketClient {
    pub fn new(
        config: Arc<ConfigBridge>,
        connector: Arc<dyn Connector>,
        socket: SocketSettings,
        updates: &UpdateSettings,
        tickets: TicketSource,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                socket,
                tickets,
                debounce: Duration::from_millis(updates.debounce_ms),
                state,
                transport: Mutex::new(None),
                subscriptions: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                dedupe: Mutex::new(UpdateDeduper::new(Duration::from_millis(
                    updates.dedupe_window_ms,
                ))),
                timers: Mutex::new(HashMap::new()),
                next_timer: AtomicU64::new(0),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected_transport().is_some()
    }

    /// Workspaces with at least one subscriber.
    pub fn subscribed_workspaces(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.inner.subscriptions).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Connect with the stored token, replacing any existing connection.
    pub async fn connect(&self) -> Result<()> {
        let config = &self.inner.config;
        config.initialize().await;

        let snapshot = config.get_all().await;
        let (server_url, token) = snapshot
            .server
            .map(|server| (server.url, server.auth.token))
            .unwrap_or_default();
        let token = if token.is_empty() {
            config.get_auth_token().await
        } else {
            token
        };
        let server_url = if server_url.is_empty() {
            config.get_server_url().await
        } else {
            server_url
        };

        if token.is_empty() {
            let location = default_config_dir()
                .map(|dir| dir.join(format!("{}.json", APP_ID)).display().to_string())
                .unwrap_or_else(|| format!("~/.canvas/config/{}.json", APP_ID));
            tracing::error!(config = %location, "No token found in server.auth.token");
        } else {
            tracing::info!(
                token = %token_preview(&token),
                jwt_shape = token.split('.').count() == 3,
                "Connecting with token"
            );
        }

        self.teardown_connection();
        self.set_state(ConnectionState::Connecting);
        tracing::info!(server = %server_url, "Connecting socket");

        let connecting = self
            .inner
            .connector
            .connect(&server_url, json!({ "token": token }));
        let connection = match timeout(self.inner.socket.connect_timeout(), connecting).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected);
                if e.is_auth() {
                    tracing::error!(error = %e, "Authentication error detected. Please check your token.");
                } else {
                    tracing::error!(error = %e, "Socket connection error");
                }
                return Err(e);
            }
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                tracing::error!("Socket connection timed out");
                return Err(ClientError::Timeout("socket connect".to_string()));
            }
        };

        *lock(&self.inner.transport) = Some(connection.transport);
        self.set_state(ConnectionState::Connected);

        let pump = tokio::spawn(self.clone().pump(connection.events));
        let ping = tokio::spawn(self.clone().ping_loop());
        lock(&self.inner.tasks).extend([pump, ping]);

        // Registrations that outlived the previous connection
        self.resubscribe_all();
        Ok(())
    }

    /// Register `callback` for `workspace_id` pushes. Must run inside a Tokio runtime.
    pub fn subscribe_to_workspace<F>(&self, workspace_id: &str, callback: F) -> SubscriptionId
    where
        F: Fn(TreeDelivery) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        let first = {
            let mut subscriptions = lock(&self.inner.subscriptions);
            let callback: TreeCallback = Arc::new(callback);
            let entry = subscriptions.entry(workspace_id.to_string()).or_default();
            entry.push((id, callback));
            entry.len() == 1
        };

        if first {
            self.emit_subscribe(workspace_id);
        }
        id
    }

    /// Remove one callback, or all of them when `subscription` is `None`.
    pub fn unsubscribe_from_workspace(&self, workspace_id: &str, subscription: Option<SubscriptionId>) {
        let emptied = {
            let mut subscriptions = lock(&self.inner.subscriptions);
            let Some(callbacks) = subscriptions.get_mut(workspace_id) else {
                return;
            };
            match subscription {
                Some(id) => callbacks.retain(|(existing, _)| *existing != id),
                None => callbacks.clear(),
            }
            if callbacks.is_empty() {
                subscriptions.remove(workspace_id);
                true
            } else {
                false
            }
        };

        if emptied {
            self.emit_unsubscribe(workspace_id);
        }
    }

    /// Fetch a workspace tree over the socket, prepared for display.
    pub async fn get_workspace_tree(&self, workspace_id: &str) -> Result<TreeNode> {
        let transport = self.connected_transport().ok_or(ClientError::NotConnected)?;
        let ack = transport.emit(TREE_GET_EVENT, vec![json!(workspace_id)])?;
        let response = self.await_ack(ack, TREE_GET_EVENT).await?;
        if !response.is_success() {
            return Err(ClientError::rejected(TREE_GET_EVENT, response.error_message()));
        }

        let payload = response
            .payload
            .ok_or_else(|| ClientError::Decode("tree ack has no payload".to_string()))?;
        let tree = parse_tree_payload(payload)?;
        Ok(prepare_for_ui(&tree))
    }

    /// Close the connection and forget every subscriber.
    pub fn disconnect(&self) {
        self.teardown_connection();
        lock(&self.inner.subscriptions).clear();
        for (_, (_, timer)) in lock(&self.inner.timers).drain() {
            timer.abort();
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Socket disconnected by client");
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.send_replace(state);
    }

    fn connected_transport(&self) -> Option<Arc<dyn Transport>> {
        lock(&self.inner.transport)
            .as_ref()
            .filter(|t| t.is_connected())
            .cloned()
    }

    fn teardown_connection(&self) {
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
        if let Some(transport) = lock(&self.inner.transport).take() {
            transport.disconnect();
        }
    }

    async fn await_ack(&self, ack: AckReceiver, event: &str) -> Result<AckResponse> {
        match timeout(self.inner.socket.ack_timeout(), ack).await {
            Err(_) => Err(ClientError::Timeout(format!("{} ack", event))),
            Ok(Err(_)) => Err(ClientError::NotConnected),
            Ok(Ok(args)) => match args.into_iter().next() {
                Some(first) => Ok(serde_json::from_value(first)?),
                None => Ok(AckResponse::default()),
            },
        }
    }

    fn emit_subscribe(&self, workspace_id: &str) {
        let Some(transport) = self.connected_transport() else {
            tracing::error!(workspace = workspace_id, "Cannot subscribe to workspace - socket not connected");
            return;
        };
        let ack = match transport.emit(SUBSCRIBE_EVENT, vec![json!(workspace_id)]) {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!(workspace = workspace_id, error = %e, "Failed to subscribe to workspace");
                return;
            }
        };

        let client = self.clone();
        let workspace_id = workspace_id.to_string();
        tokio::spawn(async move {
            match client.await_ack(ack, SUBSCRIBE_EVENT).await {
                Ok(response) if response.is_success() => {
                    tracing::info!(workspace = %workspace_id, "Subscribed to workspace");
                    let ticket = client.inner.tickets.next();
                    match client.get_workspace_tree(&workspace_id).await {
                        Ok(tree) => client.notify(&workspace_id, TreeDelivery { ticket, tree }),
                        Err(e) => {
                            tracing::error!(workspace = %workspace_id, error = %e, "Error fetching initial tree")
                        }
                    }
                }
                Ok(response) => tracing::error!(
                    workspace = %workspace_id,
                    error = %response.error_message(),
                    "Failed to subscribe to workspace"
                ),
                Err(e) => {
                    tracing::error!(workspace = %workspace_id, error = %e, "Failed to subscribe to workspace")
                }
            }
        });
    }

    fn emit_unsubscribe(&self, workspace_id: &str) {
        let Some(transport) = self.connected_transport() else {
            tracing::info!(workspace = workspace_id, "Socket not connected, skipping unsubscribe");
            return;
        };
        let ack = match transport.emit(UNSUBSCRIBE_EVENT, vec![json!(workspace_id)]) {
            Ok(ack) => ack,
            Err(e) => {
                tracing::warn!(workspace = workspace_id, error = %e, "Failed to unsubscribe from workspace");
                return;
            }
        };

        let client = self.clone();
        let workspace_id = workspace_id.to_string();
        tokio::spawn(async move {
            match client.await_ack(ack, UNSUBSCRIBE_EVENT).await {
                Ok(response) if response.is_success() => {
                    tracing::info!(workspace = %workspace_id, "Unsubscribed from workspace")
                }
                Ok(response) => tracing::warn!(
                    workspace = %workspace_id,
                    error = %response.error_message(),
                    "Failed to unsubscribe from workspace"
                ),
                Err(e) => {
                    tracing::warn!(workspace = %workspace_id, error = %e, "Failed to unsubscribe from workspace")
                }
            }
        });
    }

    fn resubscribe_all(&self) {
        for workspace_id in self.subscribed_workspaces() {
            tracing::info!(workspace = %workspace_id, "Resubscribing to workspace");
            self.emit_subscribe(&workspace_id);
        }
    }

    fn notify(&self, workspace_id: &str, delivery: TreeDelivery) {
        let callbacks: Vec<TreeCallback> = lock(&self.inner.subscriptions)
            .get(workspace_id)
            .map(|entries| entries.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        tracing::debug!(workspace = workspace_id, subscribers = callbacks.len(), "Delivering tree");
        for callback in callbacks {
            callback(delivery.clone());
        }
    }

    async fn pump(self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Connected => self.set_state(ConnectionState::Connected),
                TransportEvent::Reconnected => {
                    tracing::info!("Socket reconnected");
                    self.set_state(ConnectionState::Connected);
                    self.resubscribe_all();
                }
                TransportEvent::Disconnected { reason } => {
                    tracing::info!(reason = %reason, "Socket disconnected");
                    self.set_state(ConnectionState::Disconnected);
                }
                TransportEvent::Event { name, args } if name == TREE_UPDATED_EVENT => {
                    self.on_tree_updated(args);
                }
                TransportEvent::Event { name, .. } => {
                    tracing::debug!(event = %name, "Unhandled socket event");
                }
            }
        }
    }

    fn on_tree_updated(&self, args: Vec<Value>) {
        let Some(payload) = args.into_iter().next() else {
            return;
        };
        let event: WorkspaceUpdateEvent = match serde_json::from_value(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed tree update");
                return;
            }
        };

        let key = UpdateDeduper::key(
            &event.workspace_id,
            &event.data.operation,
            event.data.path.as_deref(),
        );
        if !lock(&self.inner.dedupe).admit(key, Instant::now()) {
            tracing::debug!(
                workspace = %event.workspace_id,
                operation = %event.data.operation,
                "Skipping duplicate tree update"
            );
            return;
        }
        tracing::debug!(
            workspace = %event.workspace_id,
            operation = %event.data.operation,
            path = ?event.data.path,
            from = ?event.data.path_from,
            to = ?event.data.path_to,
            "Tree update"
        );

        let workspace_id = event.workspace_id.clone();
        let ticket = self.inner.tickets.next();
        let generation = self.inner.next_timer.fetch_add(1, Ordering::SeqCst);
        let client = self.clone();
        let mut timers = lock(&self.inner.timers);
        if let Some((_, pending)) = timers.remove(&workspace_id) {
            pending.abort();
        }
        let timer = tokio::spawn(async move {
            sleep(client.inner.debounce).await;
            {
                let mut timers = lock(&client.inner.timers);
                if timers.get(&event.workspace_id).map(|(g, _)| *g) == Some(generation) {
                    timers.remove(&event.workspace_id);
                }
            }
            client.deliver_update(event, ticket).await;
        });
        timers.insert(workspace_id, (generation, timer));
    }

    async fn deliver_update(&self, event: WorkspaceUpdateEvent, ticket: u64) {
        let workspace_id = event.workspace_id;
        let delivery = match event.data.tree {
            Some(tree) => parse_tree_payload(tree).map(|t| TreeDelivery {
                ticket,
                tree: prepare_for_ui(&t),
            }),
            // Push without a tree: fetch the current one under a fresh ticket
            None => {
                let ticket = self.inner.tickets.next();
                self.get_workspace_tree(&workspace_id)
                    .await
                    .map(|tree| TreeDelivery { ticket, tree })
            }
        };
        match delivery {
            Ok(delivery) => self.notify(&workspace_id, delivery),
            Err(e) => tracing::error!(workspace = %workspace_id, error = %e, "Dropping tree update"),
        }
    }

    async fn ping_loop(self) {
        let period = self.inner.socket.ping_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            self.ping_once().await;
        }
    }

    async fn ping_once(&self) {
        let Some(transport) = self.connected_transport() else {
            tracing::debug!("Socket not connected, skipping ping");
            return;
        };
        let ack = match transport.emit(PING_EVENT, Vec::new()) {
            Ok(ack) => ack,
            Err(e) => {
                tracing::debug!(error = %e, "Ping not sent");
                return;
            }
        };
        match self.await_ack(ack, PING_EVENT).await {
            Ok(response) if response.success == Some(true) => {
                let server_time = response
                    .timestamp
                    .and_then(chrono::DateTime::from_timestamp_millis)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                tracing::debug!(server_time = %server_time, "Ping response");
            }
            Ok(_) => tracing::debug!("Ping acknowledged without success"),
            Err(e) => tracing::warn!(error = %e, "Ping failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::oneshot;

    use super::super::transport::Connection;

    /// Records emits and answers them from a canned table.
    #[derive(Default)]
    struct FakeTransport {
        connected: AtomicBool,
        emitted: Mutex<Vec<(String, Vec<Value>)>>,
        tree: Mutex<Option<Value>>,
        tree_delay: Mutex<Option<Duration>>,
        reject_subscribe: AtomicBool,
    }

    impl Transport for FakeTransport {
        fn emit(&self, event: &str, args: Vec<Value>) -> Result<AckReceiver> {
            if !self.is_connected() {
                return Err(ClientError::NotConnected);
            }
            lock(&self.emitted).push((event.to_string(), args));
            let reply = match event {
                SUBSCRIBE_EVENT if self.reject_subscribe.load(Ordering::SeqCst) => {
                    json!({"status": "error", "error": "no such workspace"})
                }
                TREE_GET_EVENT => match lock(&self.tree).clone() {
                    Some(tree) => json!({"status": "success", "payload": {"tree": tree}}),
                    None => json!({"status": "error", "error": "Workspace not found"}),
                },
                PING_EVENT => json!({"success": true, "timestamp": 1_700_000_000_000i64}),
                _ => json!({"status": "success"}),
            };
            let (tx, rx) = oneshot::channel();
            match *lock(&self.tree_delay) {
                Some(delay) if event == TREE_GET_EVENT => {
                    tokio::spawn(async move {
                        sleep(delay).await;
                        let _ = tx.send(vec![reply]);
                    });
                }
                _ => {
                    let _ = tx.send(vec![reply]);
                }
            }
            Ok(rx)
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    impl FakeTransport {
        fn count(&self, event: &str) -> usize {
            lock(&self.emitted).iter().filter(|(e, _)| e == event).count()
        }
    }

    struct FakeConnector {
        transport: Arc<FakeTransport>,
        events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
        fail_with: Mutex<Option<ClientError>>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _server_url: &str, auth: Value) -> Result<Connection> {
            assert!(auth.get("token").is_some());
            if let Some(err) = lock(&self.fail_with).clone() {
                return Err(err);
            }
            self.transport.connected.store(true, Ordering::SeqCst);
            let events = lock(&self.events)
                .take()
                .unwrap_or_else(|| mpsc::unbounded_channel().1);
            Ok(Connection {
                transport: self.transport.clone(),
                events,
            })
        }
    }

    struct Harness {
        client: WebSocketClient,
        transport: Arc<FakeTransport>,
        push: mpsc::UnboundedSender<TransportEvent>,
        connector: Arc<FakeConnector>,
        tickets: TicketSource,
    }

    fn harness() -> Harness {
        let transport = Arc::new(FakeTransport::default());
        *lock(&transport.tree) = Some(json!({"id": "root", "type": "universe", "name": "/",
            "children": [{"id": "a", "name": "a"}]}));
        let (push, events) = mpsc::unbounded_channel();
        let connector = Arc::new(FakeConnector {
            transport: transport.clone(),
            events: Mutex::new(Some(events)),
            fail_with: Mutex::new(None),
        });
        let config = Arc::new(ConfigBridge::new(Arc::new(MemoryStore::with_server(
            "http://localhost:8001",
            "aaa.bbb.ccc",
        ))));
        let tickets = TicketSource::new();
        let client = WebSocketClient::new(
            config,
            connector.clone(),
            SocketSettings::default(),
            &UpdateSettings::default(),
            tickets.clone(),
        );
        Harness {
            client,
            transport,
            push,
            connector,
            tickets,
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<TreeNode>>>, impl Fn(TreeDelivery) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |delivery: TreeDelivery| lock(&sink).push(delivery.tree))
    }

    fn update(workspace: &str, operation: &str, path: &str, name: &str) -> TransportEvent {
        TransportEvent::Event {
            name: TREE_UPDATED_EVENT.to_string(),
            args: vec![json!({
                "workspaceId": workspace,
                "data": {"operation": operation, "path": path,
                         "tree": {"id": "root", "type": "universe", "name": name}}
            })],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_publishes_state() {
        let h = harness();
        let mut state = h.client.watch_state();
        assert_eq!(h.client.state(), ConnectionState::Disconnected);

        h.client.connect().await.unwrap();

        assert!(h.client.is_connected());
        assert_eq!(*state.borrow_and_update(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_leaves_client_disconnected() {
        let h = harness();
        *lock(&h.connector.fail_with) = Some(ClientError::Auth("Authentication error".into()));

        let err = h.client.connect().await.unwrap_err();

        assert!(err.is_auth());
        assert_eq!(h.client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn two_subscribers_share_one_subscribe_and_both_get_the_tree() {
        let h = harness();
        h.client.connect().await.unwrap();
        let (first, cb1) = recorder();
        let (second, cb2) = recorder();

        h.client.subscribe_to_workspace("universe", cb1);
        h.client.subscribe_to_workspace("universe", cb2);
        sleep(Duration::from_millis(10)).await;

        assert_eq!(h.transport.count(SUBSCRIBE_EVENT), 1);
        assert_eq!(h.transport.count(TREE_GET_EVENT), 1);
        assert_eq!(lock(&first).len(), 1);
        assert_eq!(lock(&second).len(), 1);
        assert_eq!(lock(&first)[0].original_id.as_deref(), Some("root"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_initial_tree_keeps_the_ticket_taken_before_the_request() {
        let h = harness();
        *lock(&h.transport.tree_delay) = Some(Duration::from_millis(100));
        h.client.connect().await.unwrap();
        let tickets = Arc::new(Mutex::new(Vec::new()));
        let sink = tickets.clone();

        h.client
            .subscribe_to_workspace("universe", move |delivery: TreeDelivery| {
                lock(&sink).push(delivery.ticket)
            });
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.transport.count(TREE_GET_EVENT), 1);
        let issued_later = h.tickets.next();

        sleep(Duration::from_millis(200)).await;
        let tickets = lock(&tickets);
        assert_eq!(tickets.len(), 1);
        assert!(tickets[0] < issued_later);
    }

    #[tokio::test(start_paused = true)]
    async fn pushes_are_ticketed_on_arrival() {
        let h = harness();
        h.client.connect().await.unwrap();
        let tickets = Arc::new(Mutex::new(Vec::new()));
        let sink = tickets.clone();
        h.client
            .subscribe_to_workspace("universe", move |delivery: TreeDelivery| {
                lock(&sink).push(delivery.ticket)
            });
        sleep(Duration::from_millis(10)).await;
        lock(&tickets).clear();

        h.push.send(update("universe", "insert", "/a", "pushed")).unwrap();
        sleep(Duration::from_millis(10)).await;
        let issued_during_debounce = h.tickets.next();
        sleep(Duration::from_millis(150)).await;

        let tickets = lock(&tickets);
        assert_eq!(tickets.len(), 1);
        assert!(tickets[0] < issued_during_debounce);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_subscribe_delivers_nothing() {
        let h = harness();
        h.transport.reject_subscribe.store(true, Ordering::SeqCst);
        h.client.connect().await.unwrap();
        let (seen, cb) = recorder();

        h.client.subscribe_to_workspace("ghost", cb);
        sleep(Duration::from_millis(10)).await;

        assert!(lock(&seen).is_empty());
        assert_eq!(h.transport.count(TREE_GET_EVENT), 0);
        assert_eq!(h.client.subscribed_workspaces(), vec!["ghost".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_emits_once_when_last_callback_leaves() {
        let h = harness();
        h.client.connect().await.unwrap();
        let a = h.client.subscribe_to_workspace("universe", |_| {});
        let b = h.client.subscribe_to_workspace("universe", |_| {});

        h.client.unsubscribe_from_workspace("universe", Some(a));
        assert_eq!(h.transport.count(UNSUBSCRIBE_EVENT), 0);

        h.client.unsubscribe_from_workspace("universe", Some(b));
        h.client.unsubscribe_from_workspace("universe", None);
        assert_eq!(h.transport.count(UNSUBSCRIBE_EVENT), 1);
        assert!(h.client.subscribed_workspaces().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_pushes_within_window_deliver_once() {
        let h = harness();
        h.client.connect().await.unwrap();
        let (seen, cb) = recorder();
        h.client.subscribe_to_workspace("universe", cb);
        sleep(Duration::from_millis(10)).await;
        lock(&seen).clear();

        for _ in 0..3 {
            h.push.send(update("universe", "insert", "/a", "pushed")).unwrap();
        }
        sleep(Duration::from_millis(150)).await;

        let seen = lock(&seen);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name, "pushed");
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_keeps_only_the_latest_push() {
        let h = harness();
        h.client.connect().await.unwrap();
        let (seen, cb) = recorder();
        h.client.subscribe_to_workspace("universe", cb);
        sleep(Duration::from_millis(10)).await;
        lock(&seen).clear();

        h.push.send(update("universe", "insert", "/a", "first")).unwrap();
        sleep(Duration::from_millis(50)).await;
        h.push.send(update("universe", "remove", "/b", "second")).unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(lock(&seen).is_empty());

        sleep(Duration::from_millis(100)).await;
        let seen = lock(&seen);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_resubscribes_every_workspace() {
        let h = harness();
        h.client.connect().await.unwrap();
        h.client.subscribe_to_workspace("universe", |_| {});
        h.client.subscribe_to_workspace("work", |_| {});
        sleep(Duration::from_millis(10)).await;

        h.push
            .send(TransportEvent::Disconnected { reason: "transport close".into() })
            .unwrap();
        sleep(Duration::from_millis(1)).await;
        assert_eq!(h.client.state(), ConnectionState::Disconnected);

        h.push.send(TransportEvent::Reconnected).unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(h.client.state(), ConnectionState::Connected);
        assert_eq!(h.transport.count(SUBSCRIBE_EVENT), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn operations_without_connection_are_rejected() {
        let h = harness();
        let (seen, cb) = recorder();

        h.client.subscribe_to_workspace("universe", cb);
        sleep(Duration::from_millis(10)).await;

        assert!(matches!(
            h.client.get_workspace_tree("universe").await,
            Err(ClientError::NotConnected)
        ));
        assert!(lock(&seen).is_empty());
        assert!(lock(&h.transport.emitted).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_tree_is_rejected() {
        let h = harness();
        *lock(&h.transport.tree) = None;
        h.client.connect().await.unwrap();

        let err = h.client.get_workspace_tree("nope").await.unwrap_err();
        assert_eq!(err, ClientError::rejected(TREE_GET_EVENT, "Workspace not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn ping_runs_every_interval_while_connected() {
        let h = harness();
        h.client.connect().await.unwrap();

        sleep(Duration::from_secs(61)).await;
        assert_eq!(h.transport.count(PING_EVENT), 2);

        h.client.disconnect();
        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.transport.count(PING_EVENT), 2);
        assert_eq!(h.client.state(), ConnectionState::Disconnected);
    }
}
