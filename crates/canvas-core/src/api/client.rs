//! HTTP tree client - bearer-authenticated JSON calls against `/rest/v2`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Endpoints, InsertPath, TreeApi};
use crate::config::ConfigBridge;
use crate::error::{ClientError, Result};
use crate::settings::HttpSettings;
use crate::tree::TreeNode;

/// Server response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl Envelope {
    fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Tree payloads arrive as `{tree: {...}}` or as the root node itself.
pub fn parse_tree_payload(payload: Value) -> Result<TreeNode> {
    let tree = match payload {
        Value::Object(mut map) if map.contains_key("tree") => map.remove("tree").unwrap_or_default(),
        other => other,
    };
    Ok(serde_json::from_value(tree)?)
}

/// `TreeApi` over HTTP.
pub struct RestClient {
    http: reqwest::Client,
    config: Arc<ConfigBridge>,
}

impl RestClient {
    pub fn new(config: Arc<ConfigBridge>, settings: &HttpSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;
        Ok(Self { http, config })
    }

    async fn call(
        &self,
        operation: &str,
        method: Method,
        url: impl FnOnce(&Endpoints) -> String,
        body: Option<Value>,
    ) -> Result<Envelope> {
        // Token first: it also completes config initialization, so the
        // cached server URL is current when the endpoint is built.
        let token = self.config.get_auth_token().await;
        let url = url(&Endpoints::from_config(&self.config));
        tracing::debug!(operation, method = %method, url = %url, "REST request");

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(operation, "REST request rejected as unauthorized");
            return Err(ClientError::Auth(format!("{} returned 401", operation)));
        }

        let envelope: Option<Envelope> = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        if !status.is_success() {
            let message = envelope
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("HTTP {}", status));
            tracing::error!(operation, status = %status, message = %message, "REST request failed");
            return Err(ClientError::rejected(operation, message));
        }

        match envelope {
            // Bodiless 2xx (e.g. 204) counts as success
            None if text.trim().is_empty() => Ok(Envelope {
                status: "success".to_string(),
                ..Envelope::default()
            }),
            None => Err(ClientError::Decode(format!(
                "{}: response is not a JSON envelope",
                operation
            ))),
            Some(envelope) if envelope.is_success() => Ok(envelope),
            Some(envelope) => {
                let message = envelope
                    .message
                    .unwrap_or_else(|| format!("status '{}'", envelope.status));
                Err(ClientError::rejected(operation, message))
            }
        }
    }
}

#[async_trait]
impl TreeApi for RestClient {
    async fn get_workspace_tree(&self, workspace_id: &str) -> Result<TreeNode> {
        let envelope = self
            .call(
                "get workspace tree",
                Method::GET,
                |ep| ep.workspace_tree(workspace_id),
                None,
            )
            .await?;
        let payload = envelope
            .payload
            .ok_or_else(|| ClientError::Decode("tree response has no payload".to_string()))?;
        parse_tree_payload(payload)
    }

    async fn insert_path(&self, workspace_id: &str, request: InsertPath) -> Result<()> {
        let body = serde_json::to_value(&request)?;
        self.call(
            "insert path",
            Method::POST,
            |ep| ep.workspace_path(workspace_id),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn remove_path(&self, workspace_id: &str, path: &str) -> Result<()> {
        self.call(
            "remove path",
            Method::DELETE,
            |ep| ep.workspace_path(workspace_id),
            Some(json!({ "path": path })),
        )
        .await?;
        Ok(())
    }

    async fn move_path(
        &self,
        workspace_id: &str,
        from: &str,
        to: &str,
        recursive: bool,
    ) -> Result<()> {
        self.call(
            "move path",
            Method::POST,
            |ep| ep.workspace_path_move(workspace_id),
            Some(json!({ "from": from, "to": to, "recursive": recursive })),
        )
        .await?;
        Ok(())
    }

    async fn copy_path(
        &self,
        workspace_id: &str,
        from: &str,
        to: &str,
        recursive: bool,
    ) -> Result<()> {
        self.call(
            "copy path",
            Method::POST,
            |ep| ep.workspace_path_copy(workspace_id),
            Some(json!({ "from": from, "to": to, "recursive": recursive })),
        )
        .await?;
        Ok(())
    }

    async fn merge_up(&self, workspace_id: &str, path: &str) -> Result<()> {
        self.call(
            "merge up",
            Method::POST,
            |ep| ep.workspace_path_merge_up(workspace_id),
            Some(json!({ "path": path })),
        )
        .await?;
        Ok(())
    }

    async fn merge_down(&self, workspace_id: &str, path: &str) -> Result<()> {
        self.call(
            "merge down",
            Method::POST,
            |ep| ep.workspace_path_merge_down(workspace_id),
            Some(json!({ "path": path })),
        )
        .await?;
        Ok(())
    }

    async fn rename_layer(&self, layer_id: &str, name: &str) -> Result<()> {
        self.call(
            "rename layer",
            Method::PUT,
            |ep| ep.layer(layer_id),
            Some(json!({ "name": name })),
        )
        .await?;
        Ok(())
    }

    async fn rename_canvas(&self, canvas_id: &str, name: &str) -> Result<()> {
        self.call(
            "rename canvas",
            Method::PUT,
            |ep| ep.canvas(canvas_id),
            Some(json!({ "name": name })),
        )
        .await?;
        Ok(())
    }

    async fn remove_canvas(&self, canvas_id: &str) -> Result<()> {
        self.call(
            "remove canvas",
            Method::DELETE,
            |ep| ep.canvas(canvas_id),
            None,
        )
        .await?;
        Ok(())
    }
}
