//! Config bridge - cached auth token and server URL over a config store.
//!
//! Every accessor degrades to defaults instead of failing: an empty token,
//! the fallback server URL and an empty expanded-node list. Failures are
//! logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::store::{ConfigStore, ServerSection};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8001";
const DEFAULT_AUTH_TOKEN: &str = "";

/// Sections present in the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub server: Option<ServerSection>,
    pub expanded_nodes: Option<Vec<String>>,
}

/// Lazily initialized token/URL cache in front of a [`ConfigStore`].
pub struct ConfigBridge {
    store: Arc<dyn ConfigStore>,
    cache: RwLock<StoreSnapshot>,
    initialized: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
}

impl ConfigBridge {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(StoreSnapshot::default()),
            initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub async fn is_available(&self) -> bool {
        self.store.is_available().await
    }

    /// Load the server section into the cache; runs once.
    pub async fn initialize(&self) -> String {
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return self.cached_token();
        }

        tracing::info!("Initializing auth token");
        let token = match self.read_server().await {
            Ok(Some(server)) => {
                let token = server.auth.token.clone();
                self.update_cache(|cache| cache.server = Some(server));
                token
            }
            Ok(None) => DEFAULT_AUTH_TOKEN.to_string(),
            Err(e) => {
                tracing::error!(error = %e, "Error initializing auth token");
                DEFAULT_AUTH_TOKEN.to_string()
            }
        };
        tracing::info!(token = %token_preview(&token), "Token from store");

        self.initialized.store(true, Ordering::SeqCst);
        token
    }

    /// Auth token, waiting for the first load to complete.
    pub async fn get_auth_token(&self) -> String {
        if !self.is_initialized() {
            self.initialize().await;
        }

        match self.read_server().await {
            Ok(Some(server)) if !server.auth.token.is_empty() => server.auth.token,
            Ok(_) => DEFAULT_AUTH_TOKEN.to_string(),
            Err(e) => {
                tracing::error!(error = %e, "Error getting auth token");
                DEFAULT_AUTH_TOKEN.to_string()
            }
        }
    }

    /// Best-effort cached token; empty before initialization.
    pub fn get_auth_token_sync(&self) -> String {
        if !self.is_initialized() {
            tracing::warn!("get_auth_token_sync called before token initialized, returning default");
            return DEFAULT_AUTH_TOKEN.to_string();
        }
        self.cached_token()
    }

    pub async fn set_auth_token(&self, token: &str) -> bool {
        let mut server = match self.read_server().await {
            Ok(Some(server)) => server,
            Ok(None) => default_server(),
            Err(e) => {
                tracing::error!(error = %e, "Error setting auth token");
                return false;
            }
        };
        server.auth.token = token.to_string();

        if !self.write_server(&server, "Error setting auth token").await {
            return false;
        }
        self.update_cache(|cache| cache.server = Some(server));
        self.initialized.store(true, Ordering::SeqCst);
        true
    }

    pub async fn get_server_url(&self) -> String {
        match self.read_server().await {
            Ok(Some(server)) if !server.url.is_empty() => server.url,
            Ok(_) => DEFAULT_SERVER_URL.to_string(),
            Err(e) => {
                tracing::error!(error = %e, "Error getting server URL");
                DEFAULT_SERVER_URL.to_string()
            }
        }
    }

    pub fn get_server_url_sync(&self) -> String {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.server.as_ref().map(|s| s.url.clone()))
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    pub async fn set_server_url(&self, url: &str) -> bool {
        let mut server = match self.read_server().await {
            Ok(Some(server)) => server,
            Ok(None) => default_server(),
            Err(e) => {
                tracing::error!(error = %e, "Error setting server URL");
                return false;
            }
        };
        server.url = url.trim_end_matches('/').to_string();

        if !self.write_server(&server, "Error setting server URL").await {
            return false;
        }
        self.update_cache(|cache| cache.server = Some(server));
        true
    }

    pub async fn get_expanded_nodes(&self) -> Vec<String> {
        match self.store.get("expandedNodes").await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Malformed expandedNodes entry");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!(error = %e, "Error getting expanded nodes");
                Vec::new()
            }
        }
    }

    pub async fn save_expanded_nodes(&self, node_ids: &[String]) -> bool {
        let value = Value::from(node_ids.to_vec());
        match self.store.set("expandedNodes", value).await {
            Ok(()) => {
                self.update_cache(|cache| cache.expanded_nodes = Some(node_ids.to_vec()));
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Error saving expanded nodes");
                false
            }
        }
    }

    /// Clear the store and re-run initialization.
    pub async fn reset_config(&self) -> bool {
        if let Err(e) = self.store.clear().await {
            tracing::error!(error = %e, "Error resetting config");
            return false;
        }
        self.update_cache(|cache| *cache = StoreSnapshot::default());
        self.initialized.store(false, Ordering::SeqCst);
        self.initialize().await;
        true
    }

    /// Every present section; refreshes the cache.
    pub async fn get_all(&self) -> StoreSnapshot {
        let server = self.read_server().await;
        let expanded = self.store.get("expandedNodes").await;

        match (server, expanded) {
            (Ok(server), Ok(expanded)) => {
                let snapshot = StoreSnapshot {
                    server,
                    expanded_nodes: expanded.and_then(|v| serde_json::from_value(v).ok()),
                };
                self.update_cache(|cache| *cache = snapshot.clone());
                snapshot
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Error getting all config");
                self.cache.read().map(|c| c.clone()).unwrap_or_default()
            }
        }
    }

    async fn read_server(&self) -> crate::Result<Option<ServerSection>> {
        match self.store.get("server").await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn write_server(&self, server: &ServerSection, context: &str) -> bool {
        let value = match serde_json::to_value(server) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "{}", context);
                return false;
            }
        };
        match self.store.set("server", value).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "{}", context);
                false
            }
        }
    }

    fn cached_token(&self) -> String {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.server.as_ref().map(|s| s.auth.token.clone()))
            .unwrap_or_else(|| DEFAULT_AUTH_TOKEN.to_string())
    }

    fn update_cache(&self, f: impl FnOnce(&mut StoreSnapshot)) {
        if let Ok(mut cache) = self.cache.write() {
            f(&mut cache);
        }
    }
}

fn default_server() -> ServerSection {
    ServerSection {
        url: DEFAULT_SERVER_URL.to_string(),
        auth: Default::default(),
    }
}

/// Token shortened for logs: first 10 and last 5 characters plus length.
pub fn token_preview(token: &str) -> String {
    if token.is_empty() {
        return "empty".to_string();
    }
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 15 {
        return format!("<{} chars>", chars.len());
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{}...{} ({} chars)", head, tail, chars.len())
}
