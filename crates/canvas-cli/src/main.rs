//! Canvas tree CLI - browse and edit a Canvas workspace tree.
//!
//! Single binary that provides:
//! - `canvas-tree tree` - fetch and render the workspace tree
//! - `canvas-tree watch` - live view following server pushes
//! - context actions (`paste`, `move`, `create-layer`, ...) against the REST API
//! - `canvas-tree config` - stored server URL and auth token

mod prompt;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use canvas_core::config::{default_config_dir, token_preview};
use canvas_core::tree::render::RenderOptions;
use canvas_core::{
    AppContext, AppPhase, ClientError, ClientSettings, ConfigBridge, ConfigStore, JsonFileStore,
    TreeBrowser,
};

use crate::prompt::TerminalPrompter;
use crate::session::ServerOverride;

#[derive(Parser)]
#[command(name = "canvas-tree")]
#[command(about = "Canvas workspace tree browser", version)]
struct Cli {
    /// Config store file (default ~/.canvas/config/canvas-electron.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Client settings YAML
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Server URL for this session only
    #[arg(long, global = true)]
    server: Option<String>,

    /// Workspace to browse
    #[arg(short, long, global = true)]
    workspace: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and render the tree
    Tree {
        /// Expand every node
        #[arg(long)]
        all: bool,
    },

    /// Follow server pushes until Ctrl-C
    Watch,

    /// Expand or collapse a node
    Toggle { id: String },

    /// List expanded node ids
    Expanded,

    /// Copy (or with --cut, move) a node under a target
    Paste {
        source: String,
        target: String,
        #[arg(long)]
        cut: bool,
    },

    /// Move a node under another path
    Move {
        id: String,
        /// Destination parent path
        #[arg(long)]
        to: Option<String>,
    },

    /// Drag-and-drop reparent
    Drop { dragged: String, target: String },

    /// Create a layer under a node
    CreateLayer {
        parent: String,
        #[arg(long)]
        name: Option<String>,
    },

    /// Create a canvas under a node
    CreateCanvas {
        parent: String,
        #[arg(long)]
        name: Option<String>,
    },

    RenameLayer {
        id: String,
        #[arg(long)]
        name: Option<String>,
    },

    RenameCanvas {
        id: String,
        #[arg(long)]
        name: Option<String>,
    },

    RemoveCanvas {
        id: String,
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Insert a path below a node
    InsertPath {
        id: String,
        #[arg(long)]
        path: Option<String>,
    },

    RemovePath {
        id: String,
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },

    MergeUp { id: String },

    MergeDown { id: String },

    /// Stored configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show server URL, token and expanded nodes
    Show,

    SetToken { token: String },

    SetServer { url: String },

    /// Restore defaults
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so rendered trees stay clean on stdout
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = load_settings(cli.settings.as_deref())?;
    if let Some(workspace) = &cli.workspace {
        settings.workspace_id = workspace.clone();
    }
    let store = open_store(cli.config.as_ref(), cli.server.as_deref())?;

    match cli.command {
        Commands::Config { command } => config_command(store, command).await,
        Commands::Tree { all } => show_tree(build(settings, store, Vec::new(), false)?, all).await,
        Commands::Watch => watch(build(settings, store, Vec::new(), false)?).await,
        Commands::Toggle { id } => {
            let app = build(settings, store, Vec::new(), false)?;
            let browser = app.browser();
            browser.load_expanded().await;
            let expanded = browser.toggle(&id);
            browser.save_expanded().await;
            println!("{} {}", id, if expanded { "expanded" } else { "collapsed" });
            Ok(())
        }
        Commands::Expanded => {
            let bridge = ConfigBridge::new(store);
            for id in bridge.get_expanded_nodes().await {
                println!("{}", id);
            }
            Ok(())
        }
        command => run_action(settings, store, command).await,
    }
}

fn load_settings(path: Option<&std::path::Path>) -> Result<ClientSettings> {
    match path {
        Some(path) => ClientSettings::load(path),
        None => match default_config_dir() {
            Some(dir) => ClientSettings::load_from_dir(&dir),
            None => Ok(ClientSettings::default()),
        },
    }
}

fn open_store(path: Option<&PathBuf>, server: Option<&str>) -> Result<Arc<dyn ConfigStore>> {
    let store: Arc<dyn ConfigStore> = match path {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(JsonFileStore::open_default().context("Failed to locate config store")?),
    };
    Ok(match server {
        Some(url) => Arc::new(ServerOverride::new(store, url)),
        None => store,
    })
}

fn build(
    settings: ClientSettings,
    store: Arc<dyn ConfigStore>,
    answers: Vec<String>,
    assume_yes: bool,
) -> Result<Arc<AppContext>> {
    let prompter = Arc::new(TerminalPrompter::new(answers, assume_yes));
    Ok(AppContext::builder(settings, store).prompter(prompter).build()?)
}

fn print_tree(browser: &TreeBrowser, expand_all: bool) {
    let options = RenderOptions {
        expand_all,
        show_ids: true,
    };
    match browser.render(options) {
        Some(text) => print!("{}", text),
        None => println!("(no tree loaded)"),
    }
}

async fn show_tree(app: Arc<AppContext>, all: bool) -> Result<()> {
    let result = app.init().await;
    let browser = app.browser();

    if result.is_ok() && app.status().phase == AppPhase::Live {
        // Initial tree arrives on the subscription
        let mut revision = browser.watch_revision();
        let wait = app.settings().socket.ack_timeout() * 2;
        let arrived = tokio::time::timeout(wait, async {
            while browser.tree().is_none() {
                if revision.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        if arrived.is_err() || browser.tree().is_none() {
            tracing::warn!("No tree over the socket, fetching over HTTP");
            browser.refresh().await?;
        }
    }

    if let Some(message) = app.status().message {
        eprintln!("warning: {}", message);
    }
    app.shutdown();
    result?;

    print_tree(browser, all);
    Ok(())
}

async fn watch(app: Arc<AppContext>) -> Result<()> {
    if let Err(e) = app.init().await {
        eprintln!("error: {}", e.user_message());
    }
    let _monitor = app.start_health_monitor();

    let browser = app.browser();
    let mut revision = browser.watch_revision();
    let mut status = app.watch_status();
    print_tree(browser, false);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = revision.changed() => {
                if changed.is_err() {
                    break;
                }
                // Coalesce bursts of state changes into one redraw
                tokio::time::sleep(Duration::from_millis(50)).await;
                revision.borrow_and_update();
                println!();
                print_tree(browser, false);
                if let Some(banner) = browser.error() {
                    eprintln!("error: {}", banner);
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                eprintln!(
                    "status: {:?}{}",
                    current.phase,
                    current.message.map(|m| format!(" - {}", m)).unwrap_or_default()
                );
            }
        }
    }

    app.shutdown();
    Ok(())
}

async fn run_action(
    settings: ClientSettings,
    store: Arc<dyn ConfigStore>,
    command: Commands,
) -> Result<()> {
    let (answers, assume_yes): (Vec<String>, bool) = match &command {
        Commands::Move { to, .. } => (to.iter().cloned().collect(), false),
        Commands::CreateLayer { name, .. }
        | Commands::CreateCanvas { name, .. }
        | Commands::RenameLayer { name, .. }
        | Commands::RenameCanvas { name, .. } => (name.iter().cloned().collect(), false),
        Commands::InsertPath { path, .. } => (path.iter().cloned().collect(), false),
        Commands::RemoveCanvas { yes, .. } | Commands::RemovePath { yes, .. } => (Vec::new(), *yes),
        _ => (Vec::new(), false),
    };

    let app = build(settings, store, answers, assume_yes)?;
    let browser = app.browser();
    browser.load_expanded().await;
    browser.refresh().await?;

    let outcome = match command {
        Commands::Paste { source, target, cut } => {
            if cut {
                browser.cut(&source);
            } else {
                browser.copy(&source);
            }
            browser.paste(&target).await
        }
        Commands::Move { id, .. } => browser.move_node(&id).await,
        Commands::Drop { dragged, target } => browser.drop_node(&dragged, &target).await,
        Commands::CreateLayer { parent, .. } => browser.create_layer(&parent).await,
        Commands::CreateCanvas { parent, .. } => browser.create_canvas(&parent).await,
        Commands::RenameLayer { id, .. } => browser.rename_layer(&id).await,
        Commands::RenameCanvas { id, .. } => browser.rename_canvas(&id).await,
        Commands::RemoveCanvas { id, .. } => browser.remove_canvas(&id).await,
        Commands::InsertPath { id, .. } => browser.insert_path(&id).await,
        Commands::RemovePath { id, .. } => browser.remove_path(&id).await,
        Commands::MergeUp { id } => browser.merge_up(&id).await,
        Commands::MergeDown { id } => browser.merge_down(&id).await,
        _ => Ok(()),
    };

    match outcome {
        Ok(()) => {
            print_tree(browser, false);
            Ok(())
        }
        Err(ClientError::Cancelled) => {
            eprintln!("Cancelled.");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(e.user_message())),
    }
}

async fn config_command(store: Arc<dyn ConfigStore>, command: ConfigCommands) -> Result<()> {
    let bridge = ConfigBridge::new(store);

    match command {
        ConfigCommands::Show => {
            let token = bridge.initialize().await;
            println!("server:   {}", bridge.get_server_url().await);
            println!("token:    {}", token_preview(&token));
            let expanded = bridge.get_expanded_nodes().await;
            println!("expanded: {}", serde_json::to_string(&expanded)?);
        }
        ConfigCommands::SetToken { token } => {
            anyhow::ensure!(bridge.set_auth_token(&token).await, "Failed to store auth token");
            println!("Token stored ({})", token_preview(&token));
        }
        ConfigCommands::SetServer { url } => {
            anyhow::ensure!(bridge.set_server_url(&url).await, "Failed to store server URL");
            println!("Server URL set to {}", bridge.get_server_url().await);
        }
        ConfigCommands::Reset => {
            anyhow::ensure!(bridge.reset_config().await, "Failed to reset config");
            println!("Configuration reset to defaults");
        }
    }
    Ok(())
}
