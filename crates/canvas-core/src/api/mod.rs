//! REST API - endpoint builders and the HTTP tree client.

mod client;
mod endpoints;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::TreeNode;

pub use client::{parse_tree_payload, Envelope, RestClient};
pub use endpoints::Endpoints;

/// Body of `POST .../tree/path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertPath {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_create_layers: Option<bool>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub layer_type: Option<String>,
}

impl InsertPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            auto_create_layers: None,
            layer_type: None,
        }
    }

    /// Insert creating missing layers, typed as `layer_type`
    pub fn typed(path: impl Into<String>, layer_type: &str) -> Self {
        Self {
            path: path.into(),
            auto_create_layers: Some(true),
            layer_type: Some(layer_type.to_string()),
        }
    }
}

/// Server operations the tree browser issues.
#[async_trait]
pub trait TreeApi: Send + Sync {
    async fn get_workspace_tree(&self, workspace_id: &str) -> Result<TreeNode>;

    async fn insert_path(&self, workspace_id: &str, request: InsertPath) -> Result<()>;

    async fn remove_path(&self, workspace_id: &str, path: &str) -> Result<()>;

    async fn move_path(&self, workspace_id: &str, from: &str, to: &str, recursive: bool)
        -> Result<()>;

    async fn copy_path(&self, workspace_id: &str, from: &str, to: &str, recursive: bool)
        -> Result<()>;

    async fn merge_up(&self, workspace_id: &str, path: &str) -> Result<()>;

    async fn merge_down(&self, workspace_id: &str, path: &str) -> Result<()>;

    async fn rename_layer(&self, layer_id: &str, name: &str) -> Result<()>;

    async fn rename_canvas(&self, canvas_id: &str, name: &str) -> Result<()>;

    async fn remove_canvas(&self, canvas_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_path_body_shape() {
        let body = serde_json::to_value(InsertPath::typed("/work/notes", "canvas")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"path": "/work/notes", "autoCreateLayers": true, "type": "canvas"})
        );

        let body = serde_json::to_value(InsertPath::new("/a")).unwrap();
        assert_eq!(body, serde_json::json!({"path": "/a"}));
    }
}
