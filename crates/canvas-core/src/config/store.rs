//! Key/value config stores with dotted key paths (`server.auth.token`).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ClientError, Result};

/// Store name, also the config file stem.
pub const APP_ID: &str = "canvas-electron";

/// `server` section of the persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    pub url: String,
    #[serde(default)]
    pub auth: AuthSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(rename = "type", default = "default_auth_type")]
    pub auth_type: String,
    #[serde(default)]
    pub token: String,
}

fn default_auth_type() -> String {
    "token".to_string()
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            auth_type: default_auth_type(),
            token: String::new(),
        }
    }
}

/// Document a fresh or cleared store holds.
pub fn default_document() -> Value {
    json!({
        "server": {
            "url": super::DEFAULT_SERVER_URL,
            "auth": { "type": "token", "token": "" }
        },
        "expandedNodes": []
    })
}

/// `~/.canvas/config` (`~/Canvas/config` on Windows).
pub fn default_config_dir() -> Option<PathBuf> {
    let base = directories::BaseDirs::new()?;
    let home = if cfg!(windows) {
        base.home_dir().join("Canvas")
    } else {
        base.home_dir().join(".canvas")
    };
    Some(home.join("config"))
}

/// Persisted key/value store the config bridge reads through.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Store name
    fn name(&self) -> &str;

    /// IPC channel name this store is addressed by in the desktop shell
    fn channel(&self) -> String {
        format!("__electron_conf_{}_handler__", self.name())
    }

    /// Whether the backing host is reachable
    async fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn has(&self, key: &str) -> Result<bool>;
    /// Restore the default value of `key`
    async fn reset(&self, key: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Restore every default
    async fn clear(&self) -> Result<()>;
}

fn lookup<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(doc, |node, segment| node.get(segment))
}

fn assign(doc: &mut Value, key: &str, value: Value) {
    let segments: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut node = doc;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else {
            return;
        };
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        map.insert(last.to_string(), value);
    }
}

fn remove(doc: &mut Value, key: &str) {
    let (parent, last) = match key.rsplit_once('.') {
        Some((parent, last)) => (parent, last),
        None => ("", key),
    };
    let target = if parent.is_empty() {
        Some(doc)
    } else {
        parent
            .split('.')
            .try_fold(doc, |node, segment| node.get_mut(segment))
    };
    if let Some(Value::Object(map)) = target {
        map.remove(last);
    }
}

fn reset_key(doc: &mut Value, key: &str) {
    match lookup(&default_document(), key) {
        Some(default) => assign(doc, key, default.clone()),
        None => remove(doc, key),
    }
}

/// JSON file store, `<dir>/canvas-electron.json` by default.
pub struct JsonFileStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Store at the default location
    pub fn open_default() -> Result<Self> {
        let dir = default_config_dir()
            .ok_or_else(|| ClientError::Config("cannot resolve home directory".to_string()))?;
        Ok(Self::in_dir(&dir))
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(format!("{}.json", APP_ID)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Value> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ClientError::Config(format!("failed to parse {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(default_document()),
            Err(e) => Err(ClientError::Config(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn persist(&self, doc: &Value) -> Result<()> {
        let io_err =
            |e: std::io::Error| ClientError::Config(format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }

    async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Value) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        f(&mut doc);
        self.persist(&doc).await
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    fn name(&self) -> &str {
        APP_ID
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;
        Ok(lookup(&doc, key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.update(|doc| assign(doc, key, value)).await
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.update(|doc| reset_key(doc, key)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.update(|doc| remove(doc, key)).await
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.persist(&default_document()).await
    }
}

/// In-memory store; can be switched unavailable or failing.
pub struct MemoryStore {
    doc: Mutex<Value>,
    available: AtomicBool,
    failing: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_document(default_document())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: Value) -> Self {
        Self {
            doc: Mutex::new(doc),
            available: AtomicBool::new(true),
            failing: AtomicBool::new(false),
        }
    }

    /// Store preloaded with a server section
    pub fn with_server(url: &str, token: &str) -> Self {
        let store = Self::default();
        if let Ok(mut doc) = store.doc.lock() {
            assign(&mut doc, "server.url", json!(url));
            assign(&mut doc, "server.auth.token", json!(token));
        }
        store
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn with_doc<T>(&self, f: impl FnOnce(&mut Value) -> T) -> Result<T> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClientError::Config("store failure".to_string()));
        }
        let mut doc = self
            .doc
            .lock()
            .map_err(|_| ClientError::Config("store lock poisoned".to_string()))?;
        Ok(f(&mut doc))
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    fn name(&self) -> &str {
        APP_ID
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.with_doc(|doc| lookup(doc, key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.with_doc(|doc| assign(doc, key, value))
    }

    async fn has(&self, key: &str) -> Result<bool> {
        self.with_doc(|doc| lookup(doc, key).is_some())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.with_doc(|doc| reset_key(doc, key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.with_doc(|doc| remove(doc, key))
    }

    async fn clear(&self) -> Result<()> {
        self.with_doc(|doc| *doc = default_document())
    }
}
