//! Session CLI - Terminal Surface for a Persistent Assistant Session
//!
//! Line-oriented client: type a message and press enter, or use a slash
//! command (`/help` lists them). The conversation goes to stdout; logs go to
//! stderr so they can be redirected separately.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a local backend
//! SESSION_TOKEN=... session-cli
//!
//! # Custom backend and starting route
//! session-cli --api-origin https://app.example.com --route /datasets/42
//!
//! # With config file
//! session-cli --config ~/.config/assistant-session/client.toml
//!
//! # Verbose logging
//! RUST_LOG=debug session-cli 2> session.log
//! ```

mod repl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{info, warn};

use session_core::config::{load_config_from_path, ConfigOverrides};
use session_core::transport::WsConnector;
use session_core::{
    Credentials, Location, PreferenceStore, Preferences, RestClient, SessionClient, SessionHandle,
};

use repl::{Input, Renderer};

/// Session CLI - talk to the assistant from a terminal
#[derive(Parser, Debug)]
#[command(name = "session-cli")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Backend origin (http:// or https://)
    #[arg(short = 'o', long, env = "SESSION_API_ORIGIN", value_name = "URL")]
    api_origin: Option<String>,

    /// Bearer token; log in later with /login if omitted
    #[arg(short = 't', long, env = "SESSION_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "SESSION_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Route to report as the starting location
    #[arg(short = 'r', long, default_value = "/")]
    route: String,

    /// Maximum reconnect delay in seconds
    #[arg(long, value_name = "SECS")]
    max_backoff: Option<u64>,

    /// Welcome message for fresh conversations (empty disables it)
    #[arg(long)]
    welcome: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SESSION_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(origin) = &self.api_origin {
            overrides = overrides.with_api_origin(origin.clone());
        }
        if let Some(secs) = self.max_backoff {
            overrides = overrides.with_max_backoff_secs(secs);
        }
        if let Some(welcome) = &self.welcome {
            overrides = overrides.with_welcome_message(welcome.clone());
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("session_cli={level},session_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Whether the input loop should keep going
enum Flow {
    Continue,
    Quit,
}

/// Terminal state that outlives single commands
struct Terminal {
    handle: SessionHandle,
    store: Option<PreferenceStore>,
    prefs: Preferences,
    stdout: Stdout,
}

impl Terminal {
    async fn print(&mut self, line: &str) -> Result<()> {
        self.stdout.write_all(line.as_bytes()).await?;
        self.stdout.write_all(b"\n").await?;
        self.stdout.flush().await?;
        Ok(())
    }

    async fn execute(&mut self, input: Input) -> Result<Flow> {
        match input {
            Input::Empty => {}
            Input::Say(text) => {
                let view = self.handle.view();
                if !view.connection.state.is_connected() {
                    self.print("! Not connected; message not sent").await?;
                } else if view.is_streaming {
                    self.print("! Still answering; /stop first").await?;
                } else {
                    self.handle.send_text(text).await?;
                }
            }
            Input::Stop => self.handle.stop().await?,
            Input::Go(location) => self.handle.navigate(location).await?,
            Input::Approve(confirm_id) => {
                let view = self.handle.view();
                let pending = view.messages.iter().any(|m| {
                    m.confirm_result.is_none()
                        && m.confirm_request
                            .as_ref()
                            .is_some_and(|r| r.confirm_id == confirm_id)
                });
                if pending {
                    self.handle.approve(confirm_id).await?;
                } else {
                    self.print(&format!("! No pending confirmation '{confirm_id}'"))
                        .await?;
                }
            }
            Input::Dismiss {
                nudge_id,
                permanent,
            } => self.handle.dismiss_nudge(nudge_id, permanent).await?,
            Input::Panel(open) => self.handle.set_panel_open(open).await?,
            Input::Tone(None) => {
                let line = format!("Response tone: {}", self.prefs.tone);
                self.print(&line).await?;
            }
            Input::Tone(Some(tone)) => {
                self.prefs.tone = tone;
                if let Some(store) = &self.store {
                    if let Err(e) = store.save(&self.prefs).await {
                        warn!(error = %e, "Failed to save preferences");
                    }
                }
                self.print(&format!("Response tone set to {tone}")).await?;
            }
            Input::Login(token) => self.handle.login(Credentials::new(token)).await?,
            Input::Logout => self.handle.logout().await?,
            Input::Status => {
                for line in self.status_lines() {
                    self.print(&line).await?;
                }
            }
            Input::Help => self.print(repl::HELP).await?,
            Input::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn status_lines(&self) -> Vec<String> {
        let view = self.handle.view();
        let pending = view
            .messages
            .iter()
            .filter(|m| m.confirm_request.is_some() && m.confirm_result.is_none())
            .count();
        vec![
            format!("Connection: {}", repl::format_status(view.connection)),
            format!(
                "Session:    {}",
                view.session_id
                    .as_ref()
                    .map_or_else(|| "-".to_string(), ToString::to_string)
            ),
            format!("Logged in:  {}", view.logged_in),
            format!(
                "Assistant:  {}",
                if view.assistant_available {
                    "available"
                } else {
                    "unavailable"
                }
            ),
            format!("Location:   {} {}", view.location.route(), view.location.title),
            format!("Datasets:   {}", view.datasets.len()),
            format!("Pending confirmations: {pending}"),
            format!(
                "Dropped frames: {} malformed, {} unknown",
                view.diagnostics.malformed_frames, view.diagnostics.unknown_frames
            ),
            format!("Tone:       {}", self.prefs.tone),
        ]
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config =
        load_config_from_path(args.config.clone()).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    info!(
        origin = %config.connection.api_origin,
        source = %config.source(),
        "Configuration loaded"
    );

    let store = match PreferenceStore::default_location() {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "Preferences will not be saved");
            None
        }
    };
    let prefs = match &store {
        Some(store) => store.load().await,
        None => Preferences::default(),
    };

    let api = RestClient::new(&config.connection.api_origin, &config.api)
        .context("Failed to create REST client")?;
    let connector = WsConnector::from_config(&config.connection);
    let (client, handle) = SessionClient::new(&config, connector, api);
    let client_task = tokio::spawn(client.run());

    handle.navigate(Location::parse(&args.route, "")).await?;
    if let Some(token) = args.token.clone() {
        handle.login(Credentials::new(token)).await?;
    }

    let mut views = handle.subscribe();
    let mut renderer = Renderer::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut term = Terminal {
        handle,
        store,
        prefs,
        stdout: tokio::io::stdout(),
    };
    if args.token.is_none() {
        term.print("Not logged in. Use /login <token> (or /help).").await?;
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match repl::parse(&line) {
                    Ok(input) => {
                        if let Flow::Quit = term.execute(input).await? {
                            break;
                        }
                    }
                    Err(e) => term.print(&format!("! {e}")).await?,
                }
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                for line in renderer.update(&view) {
                    term.print(&line).await?;
                }
            }
            Some(notification) = term.handle.next_notification() => {
                let icon = notification.icon.as_deref().unwrap_or("notice");
                term.print(&format!("[{icon}] {}", notification.message)).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // The client may already be gone if its loop ended first
    let _ = term.handle.shutdown().await;
    client_task.await.context("Session client task failed")?;
    info!("Goodbye");
    Ok(())
}
