//! fht-mirror CLI
//!
//! Mirrors fht-compositor state over IPC and prints it, or sends actions.

mod follow;
mod render;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use fht_mirror_config::{Config, DEFAULT_CONFIG_PATH};
use fht_mirror_ipc::{
    names, ChannelHandler, ClientOptions, DispatcherState, Endpoint, EventReceiver, IpcClient,
    Mirror, Request, DEFAULT_CHANNEL_BUFFER,
};
use miette::IntoDiagnostic;

use crate::follow::{follow, FollowEnd};

#[derive(Parser, Debug)]
#[command(name = "fht-mirror")]
#[command(about = "Inspect and drive fht-compositor over IPC")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// Show workspaces
    Workspaces {
        /// Only show workspaces on this output
        #[arg(short, long)]
        output: Option<String>,

        /// Keep running and print again on every workspace event
        #[arg(short, long)]
        watch: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the active window
    Window {
        /// Use the active workspace on this output instead of the focused one
        #[arg(short, long)]
        output: Option<String>,

        /// Keep running and print again on every window or workspace event
        #[arg(short, long)]
        watch: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Stream raw events as JSON lines
    Events {
        /// Event names to stream (default: every mirrored event)
        names: Vec<String>,
    },

    /// Focus a workspace by id
    FocusWorkspace { id: u64 },

    /// Send an arbitrary action
    Action {
        /// Action name, e.g. "focus-workspace"
        name: String,

        /// Action parameters as a JSON object
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();
    let config = fht_mirror_config::load_config(&config_path)?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.global.log_level.as_str())
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate => cmd_validate(&config_path, &config),
        Commands::Workspaces {
            output,
            watch,
            json,
        } => cmd_workspaces(&config, output.as_deref(), watch, json).await,
        Commands::Window {
            output,
            watch,
            json,
        } => cmd_window(&config, output.as_deref(), watch, json).await,
        Commands::Events { names: event_names } => cmd_events(&config, event_names).await,
        Commands::FocusWorkspace { id } => cmd_focus_workspace(&config, id).await,
        Commands::Action { name, params } => cmd_action(&config, name, params).await,
    }
}

fn client_options(config: &Config) -> ClientOptions {
    let global = &config.global;
    let endpoint = match (&global.socket_path, &global.socket_env) {
        (Some(path), _) => Endpoint::Path(path.clone()),
        (None, Some(var)) => Endpoint::Env(var.clone()),
        (None, None) => Endpoint::default(),
    };

    ClientOptions {
        endpoint,
        pacing: config.global.pacing(),
    }
}

fn cmd_validate(config_path: &Path, config: &Config) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());
    if !config_path.exists() {
        println!("  (file not found, using defaults)");
    }

    let global = &config.global;
    println!("Configuration is valid!");
    println!("  Log level: {}", global.log_level);
    println!("  Endpoint: {}", client_options(config).endpoint);
    println!("  Pacing: {} ms", global.pacing_ms);
    println!(
        "  Initial state timeout: {} ms",
        global.initial_state_timeout_ms
    );

    Ok(())
}

/// A started client plus the channel carrying the events it was asked for
struct Session {
    client: IpcClient,
    events: EventReceiver,
}

/// Start a client subscribed to `events` and wait for the initial state
///
/// Waits until every name in `initial` has been seen once, or the stream
/// ends, or `initial-state-timeout-ms` runs out. Events that arrive after
/// the wait stay queued on the session.
async fn open_session(
    config: &Config,
    events: &[&str],
    initial: &[&str],
) -> miette::Result<Session> {
    let client = IpcClient::new(client_options(config));
    let (handler, mut rx) = ChannelHandler::new(DEFAULT_CHANNEL_BUFFER);
    for name in events {
        client.register_for_event(*name, &handler);
    }
    client.start();

    let mut pending: HashSet<&str> = initial.iter().copied().collect();
    let deadline = tokio::time::sleep(config.global.initial_state_timeout());
    tokio::pin!(deadline);

    while !pending.is_empty() {
        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!("Timed out waiting for initial state: {:?}", pending);
                break;
            }
            state = client.stopped() => {
                if state == DispatcherState::Failed {
                    client.join().await.into_diagnostic()?;
                }
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                pending.remove(event.name.as_str());
            }
        }
    }

    Ok(Session { client, events: rx })
}

/// Run `print` once, then again for every event until Ctrl-C or end of stream
async fn print_and_watch<F>(session: Session, watch: bool, print: F) -> miette::Result<()>
where
    F: Fn(&Mirror),
{
    let Session { client, events } = session;
    client.with_state_lock(&print);
    if !watch {
        return Ok(());
    }

    let end = follow(&client, events, tokio::signal::ctrl_c(), |_| {
        client.with_state_lock(&print);
    })
    .await;
    match end {
        FollowEnd::Interrupted => tracing::debug!("Interrupted"),
        FollowEnd::Stopped(state) => tracing::info!("Event stream ended ({:?})", state),
    }

    client.shutdown();
    Ok(())
}

async fn cmd_workspaces(
    config: &Config,
    output: Option<&str>,
    watch: bool,
    json: bool,
) -> miette::Result<()> {
    let session = open_session(config, names::WORKSPACE_EVENTS, &[names::WORKSPACES]).await?;

    print_and_watch(session, watch, |mirror| {
        if json {
            println!("{}", render::workspaces_json(mirror, output));
        } else {
            let lines = render::workspaces(mirror, output);
            if lines.is_empty() {
                println!("No workspaces");
            }
            for line in lines {
                println!("{}", line);
            }
            if watch {
                println!();
            }
        }
    })
    .await
}

async fn cmd_window(
    config: &Config,
    output: Option<&str>,
    watch: bool,
    json: bool,
) -> miette::Result<()> {
    let session = open_session(config, names::ALL, &[names::WORKSPACES, names::WINDOWS]).await?;

    print_and_watch(session, watch, |mirror| {
        let window = render::active_window(mirror, output);
        if json {
            println!("{}", render::window_json(mirror, window));
        } else {
            println!("{}", render::window_line(mirror, window));
        }
    })
    .await
}

async fn cmd_events(config: &Config, event_names: Vec<String>) -> miette::Result<()> {
    let event_names: Vec<String> = if event_names.is_empty() {
        names::ALL.iter().map(|name| name.to_string()).collect()
    } else {
        event_names
    };

    let client = IpcClient::new(client_options(config));
    let (handler, rx) = ChannelHandler::new(DEFAULT_CHANNEL_BUFFER);
    for name in &event_names {
        client.register_for_event(name.as_str(), &handler);
    }
    client.start();

    let end = follow(&client, rx, tokio::signal::ctrl_c(), |event| {
        println!(
            "{}",
            serde_json::json!({ "event": event.name, "data": event.data })
        );
    })
    .await;
    if end == FollowEnd::Stopped(DispatcherState::Failed) {
        client.join().await.into_diagnostic()?;
    }

    client.shutdown();
    Ok(())
}

async fn cmd_focus_workspace(config: &Config, id: u64) -> miette::Result<()> {
    let client = IpcClient::new(client_options(config));
    let response = client.focus_workspace(id).await.into_diagnostic()?;
    println!("{}", response);
    Ok(())
}

async fn cmd_action(config: &Config, name: String, params: Option<String>) -> miette::Result<()> {
    let params: serde_json::Value = match params {
        Some(text) => serde_json::from_str(&text).into_diagnostic()?,
        None => serde_json::json!({}),
    };

    let client = IpcClient::new(client_options(config));
    let response = client
        .send_command(&Request::action(name, params))
        .await
        .into_diagnostic()?;

    println!("{}", response);
    Ok(())
}
