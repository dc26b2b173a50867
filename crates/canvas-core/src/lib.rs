//! Canvas Core - workspace tree client
//!
//! This crate provides the client side of the Canvas workspace tree:
//! a persisted config/token bridge, REST endpoint builders and client,
//! a socket.io realtime client with per-workspace subscriptions, and the
//! tree browser state (expand/collapse, clipboard, context actions).

pub mod api;
pub mod app;
pub mod browser;
pub mod config;
pub mod error;
pub mod settings;
pub mod socket;
pub mod tree;

pub use api::{Endpoints, RestClient, TreeApi};
pub use app::{AppContext, AppPhase, AppStatus, HealthMonitor};
pub use browser::{ContextAction, PresetPrompter, Prompter, TreeBrowser};
pub use config::{ConfigBridge, ConfigStore, JsonFileStore, MemoryStore};
pub use error::{ClientError, Result};
pub use settings::ClientSettings;
pub use socket::{ConnectionState, WebSocketClient};
pub use tree::{ExpandedSet, NodeIndex, NodeType, TreeNode};
