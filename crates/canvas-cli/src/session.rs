//! Session-only server URL override over a persistent store.

use std::sync::Arc;

use async_trait::async_trait;
use canvas_core::{ConfigStore, Result};
use serde_json::Value;

/// Reports `server.url` as the `--server` value without writing it.
pub struct ServerOverride {
    inner: Arc<dyn ConfigStore>,
    url: String,
}

impl ServerOverride {
    pub fn new(inner: Arc<dyn ConfigStore>, url: &str) -> Self {
        Self {
            inner,
            url: url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ConfigStore for ServerOverride {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        match key {
            "server.url" => Ok(Some(Value::String(self.url.clone()))),
            "server" => {
                let mut server = self
                    .inner
                    .get("server")
                    .await?
                    .unwrap_or_else(|| Value::Object(Default::default()));
                if let Some(map) = server.as_object_mut() {
                    map.insert("url".to_string(), Value::String(self.url.clone()));
                }
                Ok(Some(server))
            }
            _ => self.inner.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn has(&self, key: &str) -> Result<bool> {
        self.inner.has(key).await
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.inner.reset(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }
}
