//! REST endpoint builders under the server base URL.

use crate::config::ConfigBridge;

/// Maps resource ids to fully qualified `/rest/v2` URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Uses the cached server URL (fallback URL before the first load)
    pub fn from_config(config: &ConfigBridge) -> Self {
        Self::new(&config.get_server_url_sync())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn workspace_tree(&self, workspace_id: &str) -> String {
        format!("{}/rest/v2/workspaces/{}/tree", self.base, workspace_id)
    }

    pub fn workspace_path(&self, workspace_id: &str) -> String {
        format!("{}/path", self.workspace_tree(workspace_id))
    }

    pub fn workspace_path_move(&self, workspace_id: &str) -> String {
        format!("{}/paths/move", self.workspace_tree(workspace_id))
    }

    pub fn workspace_path_copy(&self, workspace_id: &str) -> String {
        format!("{}/paths/copy", self.workspace_tree(workspace_id))
    }

    pub fn workspace_path_merge_up(&self, workspace_id: &str) -> String {
        format!("{}/paths/merge-up", self.workspace_tree(workspace_id))
    }

    pub fn workspace_path_merge_down(&self, workspace_id: &str) -> String {
        format!("{}/paths/merge-down", self.workspace_tree(workspace_id))
    }

    pub fn contexts(&self, context_id: &str) -> String {
        format!("{}/rest/v2/contexts/{}", self.base, context_id)
    }

    pub fn documents(&self, context_id: &str) -> String {
        format!("{}/documents", self.contexts(context_id))
    }

    pub fn layer(&self, layer_id: &str) -> String {
        format!("{}/rest/v2/layers/{}", self.base, layer_id)
    }

    pub fn canvas(&self, canvas_id: &str) -> String {
        format!("{}/rest/v2/canvases/{}", self.base, canvas_id)
    }
}
