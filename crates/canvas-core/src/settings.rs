//! Runtime settings loading, from an optional tree-browser.yaml.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "tree-browser.yaml";

/// Client runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Workspace shown by the browser
    #[serde(default = "default_workspace_id")]
    pub workspace_id: String,

    /// Realtime connection behaviour
    #[serde(default)]
    pub socket: SocketSettings,

    /// Server push coalescing
    #[serde(default)]
    pub updates: UpdateSettings,

    /// App initialization and health polling
    #[serde(default)]
    pub app: AppSettings,

    /// REST client
    #[serde(default)]
    pub http: HttpSettings,
}

fn default_workspace_id() -> String {
    "universe".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketSettings {
    pub reconnection_attempts: u32,
    pub reconnection_delay_ms: u64,
    pub reconnection_delay_max_ms: u64,
    pub connect_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    pub ping_interval_secs: u64,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            reconnection_attempts: 5,
            reconnection_delay_ms: 1000,
            reconnection_delay_max_ms: 5000,
            connect_timeout_ms: 10_000,
            ack_timeout_ms: 10_000,
            ping_interval_secs: 30,
        }
    }
}

impl SocketSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Attempt limit in the range the socket.io client accepts.
    pub fn max_reconnect_attempts(&self) -> u8 {
        u8::try_from(self.reconnection_attempts).unwrap_or(u8::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    pub dedupe_window_ms: u64,
    pub debounce_ms: u64,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 500,
            debounce_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub host_wait_ms: u64,
    pub host_poll_ms: u64,
    pub health_check_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host_wait_ms: 5000,
            host_poll_ms: 100,
            health_check_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            workspace_id: default_workspace_id(),
            socket: SocketSettings::default(),
            updates: UpdateSettings::default(),
            app: AppSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl ClientSettings {
    /// Load settings from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))?;
        Ok(settings)
    }

    /// Load from a config directory (looks for tree-browser.yaml)
    pub fn load_from_dir(config_dir: &Path) -> Result<Self> {
        let settings_path = config_dir.join(SETTINGS_FILE);
        if settings_path.exists() {
            Self::load(&settings_path)
        } else {
            Ok(Self::default())
        }
    }
}
