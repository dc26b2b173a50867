//! Persisted client configuration - store backends and the token bridge.

mod bridge;
mod store;

pub use bridge::{token_preview, ConfigBridge, StoreSnapshot, DEFAULT_SERVER_URL};
pub use store::{
    default_config_dir, default_document, AuthSection, ConfigStore, JsonFileStore, MemoryStore,
    ServerSection, APP_ID,
};
