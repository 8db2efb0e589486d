//! parking-watch - pending detection watcher for parking gate consoles
//!
//! Polls the parking backend's pending vehicle-type and exit queues, surfaces
//! each new detection once, and serves a local operator API.
//!
//! # Usage
//!
//! ```bash
//! # Run with ./parking_watch.toml or built-in defaults
//! cargo run --release
//!
//! # Point at a backend and scope to one gate
//! ./parking-watch --base-url http://10.0.0.5:8000/api --gate-id 3
//!
//! # Validate a config file and print the effective settings
//! ./parking-watch --config /etc/parking_watch.toml --check-config
//! ```
//!
//! # Environment Variables
//!
//! - `PARKING_WATCH_CONFIG`: Path to the config file
//! - `PARKING_WATCH_API_TOKEN`: Backend bearer token when the file has none
//! - `PARKING_WATCH_CORS_ORIGINS`: Allowed origins for the operator API
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use axum::Router;
use parking_watch::api::{create_app, OperatorState};
use parking_watch::config::WatchConfig;
use parking_watch::polling::{DetectionPoller, LogListener, PollerHandle, PollerSettings, QueueSource};
use parking_watch::types::QueueKind;
use parking_watch::visibility::visibility_channel;
use parking_watch::ParkingApiClient;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "parking-watch")]
#[command(about = "Pending detection watcher for parking gate consoles")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides $PARKING_WATCH_CONFIG and ./parking_watch.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the operator API address (default: "127.0.0.1:8090")
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the backend API root
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Only watch detections from this gate
    #[arg(long)]
    gate_id: Option<i64>,

    /// Poll at the fixed fallback interval instead of adapting
    #[arg(long)]
    no_adaptive: bool,

    /// Run the pollers without the operator API
    #[arg(long)]
    no_server: bool,

    /// Validate the configuration, print it as TOML and exit
    #[arg(long)]
    check_config: bool,
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    VehicleTypePoller,
    ExitPoller,
}

impl TaskName {
    fn poller(kind: QueueKind) -> Self {
        match kind {
            QueueKind::VehicleType => TaskName::VehicleTypePoller,
            QueueKind::Exit => TaskName::ExitPoller,
        }
    }
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::VehicleTypePoller => write!(f, "VehicleTypePoller"),
            TaskName::ExitPoller => write!(f, "ExitPoller"),
        }
    }
}

/// Load config from the explicit path, or the standard search order.
///
/// An explicit path that fails to load is fatal.
fn load_config(args: &CliArgs) -> Result<WatchConfig> {
    let mut config = match &args.config {
        Some(path) => WatchConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
            .with_env_overrides(),
        None => WatchConfig::load(),
    };

    if let Some(url) = &args.base_url {
        config.backend.base_url.clone_from(url);
    }
    if let Some(gate) = args.gate_id {
        config.queues.gate_id = Some(gate);
    }
    if args.no_adaptive {
        config.polling.use_adaptive = false;
    }
    if let Some(addr) = &args.addr {
        config.server.addr.clone_from(addr);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Forward a poller's join handle into the supervisor.
fn supervise_poller(task_set: &mut JoinSet<Result<TaskName>>, kind: QueueKind, join: JoinHandle<()>) {
    let name = TaskName::poller(kind);
    task_set.spawn(async move {
        join.await
            .map(|()| name)
            .map_err(|e| anyhow::anyhow!("[{}] task failed: {}", name, e))
    });
}

fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    if args.check_config {
        println!("{}", config.to_toml().context("Failed to render config")?);
        info!("✓ Configuration is valid");
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  parking-watch - pending detection watcher");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("🌐 Backend: {}", config.backend.base_url);
    match config.queues.gate_id {
        Some(gate) => info!("🚧 Gate: {}", gate),
        None => info!("🚧 Gate: all"),
    }
    info!(
        "⏱️  Polling: {}",
        if config.polling.use_adaptive {
            format!(
                "adaptive ({}ms / {}ms / {}ms)",
                config.polling.fast_interval_ms,
                config.polling.normal_interval_ms,
                config.polling.slow_interval_ms
            )
        } else {
            format!("fixed {}ms", config.polling.poll_interval_ms)
        }
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let client = ParkingApiClient::new(&config.backend).context("Failed to build backend client")?;
    let source: Arc<dyn QueueSource> = Arc::new(client.clone());
    let (visibility, observer) = visibility_channel();
    let settings = PollerSettings::from_config(&config.polling, config.queues.gate_id);

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    let mut pollers: Vec<PollerHandle> = Vec::new();

    for kind in QueueKind::ALL {
        if !config.queues.watches(kind) {
            info!("⏸️  {} queue: not watched", kind);
            continue;
        }
        let (handle, join) = DetectionPoller::new(kind, Arc::clone(&source), settings.clone(), observer.clone())
            .with_listener(LogListener)
            .spawn(cancel_token.child_token());
        supervise_poller(&mut task_set, kind, join);
        pollers.push(handle);
        info!("✓ {} queue: watching", kind);
    }

    if pollers.is_empty() {
        warn!("No queues enabled, nothing to poll");
    }

    if args.no_server {
        info!("🔌 Operator API: disabled");
    } else {
        let addr = config
            .server
            .socket_addr()
            .with_context(|| format!("Invalid server address '{}'", config.server.addr))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind operator API on {addr}"))?;
        let state = OperatorState::new(
            pollers.iter().cloned(),
            visibility.clone(),
            Some(client),
            config.queues.gate_id,
        );
        spawn_http_server(&mut task_set, listener, create_app(state), cancel_token.clone());
        info!("🔌 Operator API: http://{}", addr);
    }
    info!("");

    while let Some(joined) = task_set.join_next().await {
        match joined {
            Ok(Ok(name)) => info!("[{}] Task exited", name),
            Ok(Err(e)) => {
                error!("Task failed: {:#}", e);
                cancel_token.cancel();
            }
            Err(e) => {
                error!("Task panicked: {}", e);
                cancel_token.cancel();
            }
        }
    }

    // Handles keep the pollers alive until here
    drop(pollers);
    drop(visibility);

    info!("");
    info!("✓ parking-watch shutdown complete");
    Ok(())
}
