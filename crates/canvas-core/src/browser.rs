//! Tree browser state for one workspace.
//!
//! Holds the current tree, expand/collapse set, clipboard, loading flag and
//! error banner. Every server-backed action issues one REST call and then
//! refetches the whole tree.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::api::{InsertPath, TreeApi};
use crate::config::ConfigBridge;
use crate::error::{ClientError, Result};
use crate::tree::render::{render_tree, RenderOptions};
use crate::tree::{prepare_for_ui, ExpandedSet, IndexedNode, NodeIndex, TicketSource, TreeNode};

/// Source of dialog input for actions that need a name, path or confirmation.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// `None` when the prompt is dismissed.
    async fn prompt(&self, message: &str, default: &str) -> Option<String>;

    async fn confirm(&self, message: &str) -> bool;
}

/// Prompter answering from a queue; when the queue is empty it accepts
/// defaults if `assume_yes`, otherwise it dismisses.
#[derive(Debug, Default)]
pub struct PresetPrompter {
    answers: Mutex<VecDeque<Option<String>>>,
    assume_yes: bool,
}

impl PresetPrompter {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            assume_yes,
        }
    }

    /// Queue answers; `None` dismisses that prompt.
    pub fn with_answers<I>(assume_yes: bool, answers: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            assume_yes,
        }
    }
}

#[async_trait]
impl Prompter for PresetPrompter {
    async fn prompt(&self, _message: &str, default: &str) -> Option<String> {
        let queued = lock(&self.answers).pop_front();
        match queued {
            Some(answer) => answer,
            None if self.assume_yes => Some(default.to_string()),
            None => None,
        }
    }

    async fn confirm(&self, _message: &str) -> bool {
        self.assume_yes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardAction {
    Cut,
    Copy,
}

/// Single clipboard slot; the last cut or copy wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clipboard {
    pub action: ClipboardAction,
    pub node_id: String,
}

/// Context menu entries, keyed by the node they were opened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextAction {
    Cut(String),
    Copy(String),
    Paste(String),
    Move(String),
    CreateLayer(String),
    CreateCanvas(String),
    RenameLayer(String),
    RenameCanvas(String),
    RemoveCanvas(String),
    InsertPath(String),
    RemovePath(String),
    MergeUp(String),
    MergeDown(String),
}

#[derive(Debug, Default)]
struct State {
    tree: Option<TreeNode>,
    index: NodeIndex,
    expanded: ExpandedSet,
    clipboard: Option<Clipboard>,
    loading: usize,
    error: Option<String>,
    applied_ticket: u64,
}

struct Shared {
    workspace_id: String,
    api: Arc<dyn TreeApi>,
    config: Arc<ConfigBridge>,
    prompter: Arc<dyn Prompter>,
    state: Mutex<State>,
    tickets: TicketSource,
    revision: watch::Sender<u64>,
    persist: tokio::sync::Mutex<()>,
}

/// Browser over one workspace. Clones share state.
#[derive(Clone)]
pub struct TreeBrowser {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears one level of loading when dropped.
struct LoadingGuard<'a> {
    browser: &'a TreeBrowser,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.browser.update(|state| state.loading = state.loading.saturating_sub(1));
    }
}

pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

impl TreeBrowser {
    pub fn new(
        workspace_id: impl Into<String>,
        api: Arc<dyn TreeApi>,
        config: Arc<ConfigBridge>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                workspace_id: workspace_id.into(),
                api,
                config,
                prompter,
                state: Mutex::new(State::default()),
                tickets: TicketSource::new(),
                revision,
                persist: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.shared.workspace_id
    }

    pub fn tree(&self) -> Option<TreeNode> {
        lock(&self.shared.state).tree.clone()
    }

    pub fn node(&self, id: &str) -> Option<IndexedNode> {
        lock(&self.shared.state).index.get(id).cloned()
    }

    pub fn expanded(&self) -> ExpandedSet {
        lock(&self.shared.state).expanded.clone()
    }

    pub fn clipboard(&self) -> Option<Clipboard> {
        lock(&self.shared.state).clipboard.clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.shared.state).loading > 0
    }

    /// Page-level error banner.
    pub fn error(&self) -> Option<String> {
        lock(&self.shared.state).error.clone()
    }

    pub fn set_error(&self, message: Option<String>) {
        self.update(|state| state.error = message);
    }

    /// Bumped on every visible state change.
    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Render the current tree, `None` before the first load.
    pub fn render(&self, options: RenderOptions) -> Option<String> {
        let state = lock(&self.shared.state);
        let rendered = state
            .tree
            .as_ref()
            .map(|tree| render_tree(tree, &state.expanded, options));
        rendered
    }

    fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let result = f(&mut lock(&self.shared.state));
        self.shared.revision.send_modify(|rev| *rev += 1);
        result
    }

    // -- expand / collapse --

    pub async fn load_expanded(&self) {
        let ids = self.shared.config.get_expanded_nodes().await;
        tracing::debug!(count = ids.len(), "Loaded expanded nodes");
        self.update(|state| state.expanded = ids.into_iter().collect());
    }

    /// Flip a node's expanded state and persist the set in the background.
    /// Returns the new state. Must run inside a Tokio runtime.
    pub fn toggle(&self, node_id: &str) -> bool {
        let expanded = self.update(|state| state.expanded.toggle(node_id));
        let browser = self.clone();
        tokio::spawn(async move {
            browser.save_expanded().await;
        });
        expanded
    }

    /// Write the current expanded set. Writes are serialized and each one
    /// reads the set at write time, so the newest state lands last.
    pub async fn save_expanded(&self) -> bool {
        let _serial = self.shared.persist.lock().await;
        let ids = lock(&self.shared.state).expanded.to_vec();
        self.shared.config.save_expanded_nodes(&ids).await
    }

    // -- tree replacement --

    /// Ticket source for other tree producers, such as the socket client.
    pub fn tickets(&self) -> TicketSource {
        self.shared.tickets.clone()
    }

    fn take_ticket(&self) -> u64 {
        self.shared.tickets.next()
    }

    /// Apply `tree` if `ticket` is newer than the last applied one.
    pub fn apply_fetched(&self, ticket: u64, tree: TreeNode) -> bool {
        self.update(|state| {
            if ticket <= state.applied_ticket {
                tracing::debug!(ticket, applied = state.applied_ticket, "Dropping stale tree");
                return false;
            }
            state.index = NodeIndex::build(&tree);
            state.tree = Some(tree);
            state.applied_ticket = ticket;
            true
        })
    }

    /// Replace the tree with a pushed one.
    pub fn apply_tree(&self, tree: TreeNode) -> bool {
        let ticket = self.take_ticket();
        self.apply_fetched(ticket, tree)
    }

    async fn fetch_latest(&self) -> Result<()> {
        let ticket = self.take_ticket();
        let tree = self
            .shared
            .api
            .get_workspace_tree(&self.shared.workspace_id)
            .await?;
        self.apply_fetched(ticket, prepare_for_ui(&tree));
        Ok(())
    }

    /// Refetch the whole tree over HTTP.
    pub async fn refresh(&self) -> Result<()> {
        self.set_error(None);
        let result = self.fetch_latest().await;
        if let Err(e) = &result {
            tracing::error!(workspace = %self.shared.workspace_id, error = %e, "Error fetching tree");
            self.set_error(Some(e.user_message()));
        }
        result
    }

    fn begin_loading(&self) -> LoadingGuard<'_> {
        self.update(|state| {
            state.loading += 1;
            state.error = None;
        });
        LoadingGuard { browser: self }
    }

    /// One REST call, then an unconditional refetch.
    async fn run_action<F>(&self, action: &str, call: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let _loading = self.begin_loading();
        tracing::info!(action, workspace = %self.shared.workspace_id, "Running tree action");

        let outcome = call.await;
        let refetch = self.fetch_latest().await;

        let result = outcome.and(refetch);
        if let Err(e) = &result {
            tracing::error!(action, error = %e, "Tree action failed");
            self.set_error(Some(e.user_message()));
        }
        result
    }

    fn require(&self, node_id: &str) -> Result<IndexedNode> {
        self.node(node_id)
            .ok_or_else(|| ClientError::UnknownNode(node_id.to_string()))
    }

    async fn ask(&self, message: &str, default: &str) -> Result<String> {
        match self.shared.prompter.prompt(message, default).await {
            Some(answer) if !answer.trim().is_empty() => Ok(answer.trim().to_string()),
            _ => Err(ClientError::Cancelled),
        }
    }

    async fn ensure_confirmed(&self, message: &str) -> Result<()> {
        if self.shared.prompter.confirm(message).await {
            Ok(())
        } else {
            Err(ClientError::Cancelled)
        }
    }

    // -- context actions --

    pub async fn dispatch(&self, action: ContextAction) -> Result<()> {
        match action {
            ContextAction::Cut(id) => {
                self.cut(&id);
                Ok(())
            }
            ContextAction::Copy(id) => {
                self.copy(&id);
                Ok(())
            }
            ContextAction::Paste(target) => self.paste(&target).await,
            ContextAction::Move(id) => self.move_node(&id).await,
            ContextAction::CreateLayer(parent) => self.create_layer(&parent).await,
            ContextAction::CreateCanvas(parent) => self.create_canvas(&parent).await,
            ContextAction::RenameLayer(id) => self.rename_layer(&id).await,
            ContextAction::RenameCanvas(id) => self.rename_canvas(&id).await,
            ContextAction::RemoveCanvas(id) => self.remove_canvas(&id).await,
            ContextAction::InsertPath(id) => self.insert_path(&id).await,
            ContextAction::RemovePath(id) => self.remove_path(&id).await,
            ContextAction::MergeUp(id) => self.merge_up(&id).await,
            ContextAction::MergeDown(id) => self.merge_down(&id).await,
        }
    }

    pub fn cut(&self, node_id: &str) {
        self.update(|state| {
            state.clipboard = Some(Clipboard {
                action: ClipboardAction::Cut,
                node_id: node_id.to_string(),
            })
        });
    }

    pub fn copy(&self, node_id: &str) {
        self.update(|state| {
            state.clipboard = Some(Clipboard {
                action: ClipboardAction::Copy,
                node_id: node_id.to_string(),
            })
        });
    }

    /// Move or copy the clipboard node under `target_id`. Empty clipboard is a no-op.
    pub async fn paste(&self, target_id: &str) -> Result<()> {
        let Some(clipboard) = self.clipboard() else {
            tracing::debug!("Paste with empty clipboard");
            return Ok(());
        };
        let source = self.require(&clipboard.node_id)?;
        let target = self.require(target_id)?;

        if clipboard.action == ClipboardAction::Cut {
            self.update(|state| state.clipboard = None);
        }

        let api = &self.shared.api;
        let ws = &self.shared.workspace_id;
        match clipboard.action {
            ClipboardAction::Cut => {
                self.run_action("paste", api.move_path(ws, &source.path, &target.path, true))
                    .await
            }
            ClipboardAction::Copy => {
                self.run_action("paste", api.copy_path(ws, &source.path, &target.path, true))
                    .await
            }
        }
    }

    /// Prompt for a destination parent path, defaulting to the current one.
    pub async fn move_node(&self, node_id: &str) -> Result<()> {
        let node = self.require(node_id)?;
        let current_parent = lock(&self.shared.state)
            .index
            .parent_path_of(node_id)
            .unwrap_or("/")
            .to_string();

        let destination = self
            .ask(&format!("Move '{}' to path:", node.name), &current_parent)
            .await?;

        let api = &self.shared.api;
        self.run_action(
            "move",
            api.move_path(&self.shared.workspace_id, &node.path, &destination, true),
        )
        .await
    }

    /// Drag and drop reparent of `dragged_id` under `target_id`.
    pub async fn drop_node(&self, dragged_id: &str, target_id: &str) -> Result<()> {
        if dragged_id == target_id {
            return Ok(());
        }
        let dragged = self.require(dragged_id)?;
        let target = self.require(target_id)?;

        let into_descendant = lock(&self.shared.state)
            .index
            .is_ancestor(dragged_id, target_id);
        if into_descendant {
            let err = ClientError::Refused(format!(
                "Cannot move '{}' into its own descendant '{}'",
                dragged.name, target.name
            ));
            self.set_error(Some(err.user_message()));
            return Err(err);
        }

        let api = &self.shared.api;
        self.run_action(
            "drop",
            api.move_path(&self.shared.workspace_id, &dragged.path, &target.path, true),
        )
        .await
    }

    pub async fn create_layer(&self, parent_id: &str) -> Result<()> {
        self.create_child(parent_id, "layer", "Layer name:").await
    }

    pub async fn create_canvas(&self, parent_id: &str) -> Result<()> {
        self.create_child(parent_id, "canvas", "Canvas name:").await
    }

    async fn create_child(&self, parent_id: &str, kind: &str, message: &str) -> Result<()> {
        let parent = self.require(parent_id)?;
        let name = self.ask(message, "").await?;
        let request = InsertPath::typed(child_path(&parent.path, &name), kind);

        let api = &self.shared.api;
        self.run_action(
            &format!("create {}", kind),
            api.insert_path(&self.shared.workspace_id, request),
        )
        .await
    }

    pub async fn rename_layer(&self, node_id: &str) -> Result<()> {
        let node = self.require(node_id)?;
        let name = self.ask("New layer name:", &node.name).await?;
        self.run_action("rename layer", self.shared.api.rename_layer(&node.id, &name))
            .await
    }

    pub async fn rename_canvas(&self, node_id: &str) -> Result<()> {
        let node = self.require(node_id)?;
        let name = self.ask("New canvas name:", &node.name).await?;
        self.run_action("rename canvas", self.shared.api.rename_canvas(&node.id, &name))
            .await
    }

    pub async fn remove_canvas(&self, node_id: &str) -> Result<()> {
        let node = self.require(node_id)?;
        self.ensure_confirmed(&format!("Remove canvas '{}'?", node.name))
            .await?;
        self.run_action("remove canvas", self.shared.api.remove_canvas(&node.id))
            .await
    }

    pub async fn insert_path(&self, node_id: &str) -> Result<()> {
        let node = self.require(node_id)?;
        let default = if node.path == "/" {
            "/".to_string()
        } else {
            format!("{}/", node.path)
        };
        let path = self.ask("Path to insert:", &default).await?;

        let api = &self.shared.api;
        self.run_action(
            "insert path",
            api.insert_path(&self.shared.workspace_id, InsertPath::new(path)),
        )
        .await
    }

    pub async fn remove_path(&self, node_id: &str) -> Result<()> {
        let node = self.require(node_id)?;
        self.ensure_confirmed(&format!("Remove path '{}'?", node.path))
            .await?;
        let api = &self.shared.api;
        self.run_action(
            "remove path",
            api.remove_path(&self.shared.workspace_id, &node.path),
        )
        .await
    }

    pub async fn merge_up(&self, node_id: &str) -> Result<()> {
        let node = self.require(node_id)?;
        let api = &self.shared.api;
        self.run_action(
            "merge up",
            api.merge_up(&self.shared.workspace_id, &node.path),
        )
        .await
    }

    pub async fn merge_down(&self, node_id: &str) -> Result<()> {
        let node = self.require(node_id)?;
        let api = &self.shared.api;
        self.run_action(
            "merge down",
            api.merge_down(&self.shared.workspace_id, &node.path),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::tree::NodeType;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Records calls; serves a fixed tree whose root name counts fetches.
    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<String>>,
        fetches: AtomicU64,
        fail_calls: Mutex<Option<ClientError>>,
        fetch_delay: Mutex<Option<Duration>>,
    }

    impl FakeApi {
        fn record(&self, call: String) -> Result<()> {
            lock(&self.calls).push(call);
            match lock(&self.fail_calls).clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        fn calls(&self) -> Vec<String> {
            lock(&self.calls).clone()
        }
    }

    fn sample_tree(label: &str) -> TreeNode {
        TreeNode::new("root", label, NodeType::Universe).with_children(vec![
            TreeNode::new("work", "work", NodeType::Context).with_children(vec![
                TreeNode::new("notes", "notes", NodeType::Canvas),
            ]),
            TreeNode::new("home", "home", NodeType::Context),
        ])
    }

    #[async_trait]
    impl TreeApi for FakeApi {
        async fn get_workspace_tree(&self, _workspace_id: &str) -> Result<TreeNode> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = *lock(&self.fetch_delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(sample_tree(&format!("fetch-{}", n)))
        }

        async fn insert_path(&self, ws: &str, request: InsertPath) -> Result<()> {
            self.record(format!(
                "insert {} {} {:?}",
                ws, request.path, request.layer_type
            ))
        }

        async fn remove_path(&self, ws: &str, path: &str) -> Result<()> {
            self.record(format!("remove {} {}", ws, path))
        }

        async fn move_path(&self, ws: &str, from: &str, to: &str, recursive: bool) -> Result<()> {
            self.record(format!("move {} {} -> {} {}", ws, from, to, recursive))
        }

        async fn copy_path(&self, ws: &str, from: &str, to: &str, recursive: bool) -> Result<()> {
            self.record(format!("copy {} {} -> {} {}", ws, from, to, recursive))
        }

        async fn merge_up(&self, ws: &str, path: &str) -> Result<()> {
            self.record(format!("merge-up {} {}", ws, path))
        }

        async fn merge_down(&self, ws: &str, path: &str) -> Result<()> {
            self.record(format!("merge-down {} {}", ws, path))
        }

        async fn rename_layer(&self, id: &str, name: &str) -> Result<()> {
            self.record(format!("rename-layer {} {}", id, name))
        }

        async fn rename_canvas(&self, id: &str, name: &str) -> Result<()> {
            self.record(format!("rename-canvas {} {}", id, name))
        }

        async fn remove_canvas(&self, id: &str) -> Result<()> {
            self.record(format!("remove-canvas {}", id))
        }
    }

    struct Fixture {
        browser: TreeBrowser,
        api: Arc<FakeApi>,
        config: Arc<ConfigBridge>,
    }

    async fn fixture(prompter: PresetPrompter) -> Fixture {
        let api = Arc::new(FakeApi::default());
        let config = Arc::new(ConfigBridge::new(Arc::new(MemoryStore::new())));
        let browser = TreeBrowser::new("universe", api.clone(), config.clone(), Arc::new(prompter));
        browser.refresh().await.unwrap();
        Fixture {
            browser,
            api,
            config,
        }
    }

    fn answers(items: &[Option<&str>]) -> PresetPrompter {
        PresetPrompter::with_answers(false, items.iter().map(|a| a.map(str::to_string)))
    }

    #[tokio::test]
    async fn every_action_refetches_once() {
        let f = fixture(PresetPrompter::new(true)).await;
        assert_eq!(f.api.fetches.load(Ordering::SeqCst), 1);

        f.browser.merge_up("notes").await.unwrap();
        f.browser.merge_down("work").await.unwrap();

        assert_eq!(
            f.api.calls(),
            vec!["merge-up universe /work/notes", "merge-down universe /work"]
        );
        assert_eq!(f.api.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(f.browser.tree().unwrap().name, "fetch-3");
        assert!(!f.browser.is_loading());
    }

    #[tokio::test]
    async fn failed_action_sets_banner_and_still_refetches() {
        let f = fixture(PresetPrompter::new(true)).await;
        *lock(&f.api.fail_calls) = Some(ClientError::rejected("remove canvas", "Canvas not found"));

        let err = f.browser.remove_canvas("notes").await.unwrap_err();

        assert_eq!(err, ClientError::rejected("remove canvas", "Canvas not found"));
        assert_eq!(f.browser.error().as_deref(), Some("Canvas not found"));
        assert_eq!(f.api.fetches.load(Ordering::SeqCst), 2);
        assert!(!f.browser.is_loading());
    }

    #[tokio::test]
    async fn cut_then_paste_moves_and_clears_clipboard() {
        let f = fixture(PresetPrompter::new(true)).await;

        f.browser.cut("notes");
        f.browser.paste("home").await.unwrap();

        assert_eq!(f.api.calls(), vec!["move universe /work/notes -> /home true"]);
        assert!(f.browser.clipboard().is_none());
    }

    #[tokio::test]
    async fn copy_keeps_clipboard_and_last_write_wins() {
        let f = fixture(PresetPrompter::new(true)).await;

        f.browser.cut("work");
        f.browser.copy("notes");
        f.browser.paste("home").await.unwrap();

        assert_eq!(f.api.calls(), vec!["copy universe /work/notes -> /home true"]);
        assert_eq!(
            f.browser.clipboard(),
            Some(Clipboard {
                action: ClipboardAction::Copy,
                node_id: "notes".to_string()
            })
        );
    }

    #[tokio::test]
    async fn paste_with_empty_clipboard_is_a_noop() {
        let f = fixture(PresetPrompter::new(true)).await;
        f.browser.paste("home").await.unwrap();
        assert!(f.api.calls().is_empty());
        assert_eq!(f.api.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_rules() {
        let f = fixture(PresetPrompter::new(true)).await;

        f.browser.drop_node("work", "work").await.unwrap();
        assert!(f.api.calls().is_empty());

        let err = f.browser.drop_node("work", "notes").await.unwrap_err();
        assert!(matches!(err, ClientError::Refused(_)));
        assert!(f.browser.error().unwrap().contains("descendant"));
        assert!(f.api.calls().is_empty());

        f.browser.drop_node("notes", "home").await.unwrap();
        assert_eq!(f.api.calls(), vec!["move universe /work/notes -> /home true"]);
        assert!(f.browser.error().is_none());
    }

    #[tokio::test]
    async fn dismissed_prompt_cancels_without_rest_call() {
        let f = fixture(answers(&[None, Some("   ")])).await;

        assert_eq!(f.browser.create_layer("work").await, Err(ClientError::Cancelled));
        assert_eq!(f.browser.rename_canvas("notes").await, Err(ClientError::Cancelled));
        assert_eq!(f.browser.remove_path("work").await, Err(ClientError::Cancelled));

        assert!(f.api.calls().is_empty());
        assert!(f.browser.error().is_none());
    }

    #[tokio::test]
    async fn prompts_build_paths_and_defaults() {
        let f = fixture(answers(&[Some("drafts"), Some("paper"), Some("/work/a/b")])).await;

        f.browser.create_layer("work").await.unwrap();
        f.browser.create_canvas("root").await.unwrap();
        f.browser.insert_path("work").await.unwrap();

        assert_eq!(
            f.api.calls(),
            vec![
                "insert universe /work/drafts Some(\"layer\")",
                "insert universe /paper Some(\"canvas\")",
                "insert universe /work/a/b None",
            ]
        );
    }

    #[tokio::test]
    async fn move_and_rename_default_to_current_values() {
        let f = fixture(PresetPrompter::new(true)).await;

        f.browser.move_node("notes").await.unwrap();
        f.browser.rename_layer("work").await.unwrap();

        assert_eq!(
            f.api.calls(),
            vec!["move universe /work/notes -> /work true", "rename-layer work work"]
        );
    }

    #[tokio::test]
    async fn dispatch_routes_context_actions() {
        let f = fixture(PresetPrompter::new(true)).await;

        f.browser.dispatch(ContextAction::Copy("home".into())).await.unwrap();
        f.browser.dispatch(ContextAction::Paste("work".into())).await.unwrap();
        f.browser.dispatch(ContextAction::RemovePath("home".into())).await.unwrap();

        assert_eq!(
            f.api.calls(),
            vec!["copy universe /home -> /work true", "remove universe /home"]
        );
    }

    #[tokio::test]
    async fn unknown_node_is_reported() {
        let f = fixture(PresetPrompter::new(true)).await;
        assert_eq!(
            f.browser.merge_up("ghost").await,
            Err(ClientError::UnknownNode("ghost".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_does_not_overwrite_newer_push() {
        let f = fixture(PresetPrompter::new(true)).await;
        *lock(&f.api.fetch_delay) = Some(Duration::from_secs(1));

        let browser = f.browser.clone();
        let slow = tokio::spawn(async move { browser.refresh().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        f.browser.apply_tree(sample_tree("pushed"));
        slow.await.unwrap().unwrap();

        assert_eq!(f.browser.tree().unwrap().name, "pushed");
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_ticketed_before_a_refresh_is_dropped() {
        let f = fixture(PresetPrompter::new(true)).await;
        let early = f.browser.tickets().next();

        f.browser.refresh().await.unwrap();
        let refreshed = f.browser.tree().unwrap().name;

        assert!(!f.browser.apply_fetched(early, sample_tree("socket")));
        assert_eq!(f.browser.tree().unwrap().name, refreshed);
        assert!(f.browser.apply_fetched(f.browser.tickets().next(), sample_tree("socket")));
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_persists_expanded_set() {
        let f = fixture(PresetPrompter::new(true)).await;

        assert!(f.browser.toggle("work"));
        assert!(f.browser.toggle("root"));
        assert!(!f.browser.toggle("work"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(f.config.get_expanded_nodes().await, vec!["root".to_string()]);

        let reloaded = TreeBrowser::new(
            "universe",
            f.api.clone(),
            f.config.clone(),
            Arc::new(PresetPrompter::new(false)),
        );
        reloaded.load_expanded().await;
        assert!(reloaded.expanded().is_expanded("root"));
        assert!(!reloaded.expanded().is_expanded("work"));
    }

    #[tokio::test]
    async fn render_shows_expanded_children_only() {
        let f = fixture(PresetPrompter::new(true)).await;
        f.browser.toggle("root");

        let text = f.browser.render(RenderOptions::default()).unwrap();
        assert!(text.contains("work"));
        assert!(!text.contains("notes"));
    }
}
