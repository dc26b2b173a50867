//! Application context - wires config, REST, socket and browser together
//! and drives initialization.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, sleep, Instant};

use crate::api::{RestClient, TreeApi};
use crate::browser::{PresetPrompter, Prompter, TreeBrowser};
use crate::config::{ConfigBridge, ConfigStore};
use crate::error::{ClientError, Result};
use crate::settings::ClientSettings;
use crate::socket::{Connector, SubscriptionId, TreeDelivery, WebSocketClient, WsConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Loading,
    /// Socket connected and subscribed
    Live,
    /// Socket failed, tree loaded over HTTP
    Fallback,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStatus {
    pub phase: AppPhase,
    pub message: Option<String>,
}

impl AppStatus {
    fn new(phase: AppPhase, message: Option<String>) -> Self {
        Self { phase, message }
    }
}

/// Banner text for a failed connection, by error kind.
pub fn connection_message(err: &ClientError) -> String {
    match err {
        ClientError::Auth(_) | ClientError::HostUnavailable => err.user_message(),
        other => format!("Failed to connect to server: {}", other.user_message()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct AppBuilder {
    settings: ClientSettings,
    store: Arc<dyn ConfigStore>,
    connector: Option<Arc<dyn Connector>>,
    api: Option<Arc<dyn TreeApi>>,
    prompter: Option<Arc<dyn Prompter>>,
}

impl AppBuilder {
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn api(mut self, api: Arc<dyn TreeApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn build(self) -> Result<Arc<AppContext>> {
        let settings = self.settings;
        let config = Arc::new(ConfigBridge::new(self.store));

        let api: Arc<dyn TreeApi> = match self.api {
            Some(api) => api,
            None => Arc::new(RestClient::new(config.clone(), &settings.http)?),
        };
        let connector: Arc<dyn Connector> = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector::new(settings.socket.clone())));
        let prompter: Arc<dyn Prompter> = self
            .prompter
            .unwrap_or_else(|| Arc::new(PresetPrompter::new(false)));

        let browser = TreeBrowser::new(settings.workspace_id.clone(), api, config.clone(), prompter);
        // Socket deliveries and HTTP refreshes draw from one ticket sequence
        let socket = WebSocketClient::new(
            config.clone(),
            connector,
            settings.socket.clone(),
            &settings.updates,
            browser.tickets(),
        );
        let (status, _) = watch::channel(AppStatus::new(AppPhase::Loading, None));

        Ok(Arc::new(AppContext {
            settings,
            config,
            socket,
            browser,
            status,
            subscription: Mutex::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            monitor: Mutex::new(None),
        }))
    }
}

/// Stops the health monitor when dropped.
pub struct HealthMonitor {
    handle: AbortHandle,
}

impl HealthMonitor {
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Process-wide client state, constructed once.
pub struct AppContext {
    settings: ClientSettings,
    config: Arc<ConfigBridge>,
    socket: WebSocketClient,
    browser: TreeBrowser,
    status: watch::Sender<AppStatus>,
    subscription: Mutex<Option<SubscriptionId>>,
    init_lock: tokio::sync::Mutex<()>,
    monitor: Mutex<Option<AbortHandle>>,
}

impl AppContext {
    pub fn builder(settings: ClientSettings, store: Arc<dyn ConfigStore>) -> AppBuilder {
        AppBuilder {
            settings,
            store,
            connector: None,
            api: None,
            prompter: None,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn config(&self) -> &Arc<ConfigBridge> {
        &self.config
    }

    pub fn socket(&self) -> &WebSocketClient {
        &self.socket
    }

    pub fn browser(&self) -> &TreeBrowser {
        &self.browser
    }

    pub fn status(&self) -> AppStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<AppStatus> {
        self.status.subscribe()
    }

    fn publish(&self, phase: AppPhase, message: Option<String>) {
        self.status.send_replace(AppStatus::new(phase, message));
    }

    /// Host wait, token, socket, subscription; HTTP fallback if the socket fails.
    pub async fn init(&self) -> Result<()> {
        let _running = self.init_lock.lock().await;
        self.publish(AppPhase::Loading, None);

        if let Err(e) = self.wait_for_host().await {
            let message = connection_message(&e);
            tracing::error!(error = %e, "Config store never became available");
            self.browser.set_error(Some(message.clone()));
            self.publish(AppPhase::Failed, Some(message));
            return Err(e);
        }

        tracing::info!("Waiting for token initialization");
        self.config.initialize().await;
        self.browser.load_expanded().await;

        match self.socket.connect().await {
            Ok(()) => {
                self.ensure_subscribed();
                self.browser.set_error(None);
                self.publish(AppPhase::Live, None);
                tracing::info!(workspace = %self.settings.workspace_id, "Client is live");
                Ok(())
            }
            Err(e) => {
                let message = connection_message(&e);
                tracing::warn!(error = %e, "Socket unavailable, falling back to HTTP");

                match self.browser.refresh().await {
                    Ok(()) => {
                        self.publish(AppPhase::Fallback, Some(message));
                        Ok(())
                    }
                    Err(fetch) => {
                        tracing::error!(error = %fetch, "HTTP fallback failed");
                        self.browser.set_error(Some(message.clone()));
                        self.publish(AppPhase::Failed, Some(message));
                        Err(e)
                    }
                }
            }
        }
    }

    /// Manual retry from the error banner.
    pub async fn retry(&self) -> Result<()> {
        tracing::info!("Retrying initialization");
        self.init().await
    }

    async fn wait_for_host(&self) -> Result<()> {
        let poll = Duration::from_millis(self.settings.app.host_poll_ms.max(1));
        let deadline = Instant::now() + Duration::from_millis(self.settings.app.host_wait_ms);
        loop {
            if self.config.is_available().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ClientError::HostUnavailable);
            }
            sleep(poll).await;
        }
    }

    /// Subscribe the browser unless a live registration already exists;
    /// `connect` restores registrations that survived a reconnect.
    fn ensure_subscribed(&self) {
        let workspace_id = &self.settings.workspace_id;
        let mut subscription = lock(&self.subscription);
        let registered = self.socket.subscribed_workspaces().contains(workspace_id);
        if subscription.is_some() && registered {
            return;
        }

        let browser = self.browser.clone();
        let id = self.socket.subscribe_to_workspace(workspace_id, move |delivery: TreeDelivery| {
            browser.apply_fetched(delivery.ticket, delivery.tree);
        });
        *subscription = Some(id);
    }

    /// Re-run `init` every `health_check_secs` while the socket is down.
    pub fn start_health_monitor(self: &Arc<Self>) -> HealthMonitor {
        let period = Duration::from_secs(self.settings.app.health_check_secs.max(1));
        let app: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(app) = app.upgrade() else {
                    break;
                };
                if !app.socket.is_connected() {
                    tracing::info!("Connection lost, attempting to reconnect");
                    if let Err(e) = app.init().await {
                        tracing::warn!(error = %e, "Reinitialization failed");
                    }
                }
            }
        });

        if let Some(previous) = lock(&self.monitor).replace(task.abort_handle()) {
            previous.abort();
        }
        HealthMonitor {
            handle: task.abort_handle(),
        }
    }

    pub fn shutdown(&self) {
        if let Some(monitor) = lock(&self.monitor).take() {
            monitor.abort();
        }
        if let Some(id) = lock(&self.subscription).take() {
            self.socket
                .unsubscribe_from_workspace(&self.settings.workspace_id, Some(id));
        }
        self.socket.disconnect();
        tracing::info!("Client shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_messages_by_kind() {
        assert!(connection_message(&ClientError::Auth("bad".into())).starts_with("Authentication failed"));
        assert!(connection_message(&ClientError::HostUnavailable).contains("Configuration store"));
        assert_eq!(
            connection_message(&ClientError::Timeout("socket connect".into())),
            "Failed to connect to server: timed out waiting for socket connect"
        );
    }
}
