//! llamawatchd - health-aware metrics bridge for an inference server.
//!
//! Periodically probes a llama-server instance over HTTP, samples its process
//! from /proc, and serves the result as Prometheus metrics on `/metrics`.

mod handlers;
mod state;

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(target_os = "linux")]
use llamawatch_core::collector::RealFs;
#[cfg(not(target_os = "linux"))]
use llamawatch_core::collector::mock::MockFs;
use llamawatch_core::collector::ProcessLocator;
use llamawatch_core::config::{DuplicatePolicy, WatchdogConfig};
use llamawatch_core::probe::ServerProbe;
use llamawatch_core::registry::{BuildInfo, MetricsRegistry};
use llamawatch_core::watchdog::Watchdog;

use state::AppState;

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(
    name = "llamawatchd",
    about = "Health-aware metrics bridge for llama-server",
    version = llamawatch_core::VERSION
)]
struct Args {
    /// Base URL of the inference server.
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "LLAMAWATCH_TARGET_URL")]
    target_url: String,

    /// Listen address of the metrics endpoint.
    #[arg(long, default_value = "0.0.0.0:9180", env = "LLAMAWATCH_LISTEN")]
    listen: String,

    /// Collection interval in seconds.
    #[arg(long, default_value = "15", env = "LLAMAWATCH_INTERVAL")]
    interval: u64,

    /// Per-request timeout for upstream probes, in seconds.
    #[arg(long, default_value = "3", env = "LLAMAWATCH_TIMEOUT")]
    timeout: u64,

    /// Substring identifying the server in a process command line.
    #[arg(long, default_value = "llama-server", env = "LLAMAWATCH_PROCESS_NAME")]
    process_name: String,

    /// What to do when several processes match: "warn" or "ignore".
    /// The lowest PID is used either way.
    #[arg(long, default_value = "warn", env = "LLAMAWATCH_DUPLICATE_POLICY")]
    duplicate_policy: DuplicatePolicy,

    /// Model path reported in the llamawatch_info metric.
    #[arg(long, default_value = "", env = "LLAMAWATCH_MODEL_PATH")]
    model_path: String,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig {
            target_url: self.target_url.clone(),
            interval: Duration::from_secs(self.interval),
            timeout: Duration::from_secs(self.timeout),
            process_name: self.process_name.clone(),
            duplicate_policy: self.duplicate_policy,
            proc_path: self.proc_path.clone(),
            model_path: self.model_path.clone(),
        }
    }
}

/// Initializes the tracing subscriber.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    // RUST_LOG wins when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "llamawatchd={level},llamawatch_core={level},tower_http={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(handlers::handle_metrics))
        .route("/healthz", get(handlers::handle_health))
        .with_state(state)
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = args.watchdog_config();
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };
    runtime.block_on(async_main(args.listen, config));
}

#[cfg(target_os = "linux")]
fn filesystem() -> RealFs {
    RealFs::new()
}

#[cfg(not(target_os = "linux"))]
fn filesystem() -> MockFs {
    warn!("no /proc on this platform, process metrics stay unobserved");
    MockFs::new()
}

async fn async_main(listen: String, config: WatchdogConfig) {
    let addr: SocketAddr = match listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(%listen, error = %e, "invalid listen address");
            process::exit(1);
        }
    };

    let probe = match ServerProbe::from_config(&config) {
        Ok(probe) => probe,
        Err(e) => {
            error!(error = %e, "failed to create server probe");
            process::exit(1);
        }
    };

    let info = BuildInfo {
        version: llamawatch_core::VERSION.to_string(),
        model_path: config.model_path.clone(),
        target_url: config.target_url.clone(),
    };
    let registry = match MetricsRegistry::new(&info) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!(error = %e, "failed to register metrics");
            process::exit(1);
        }
    };

    info!(
        version = llamawatch_core::VERSION,
        health_url = %probe.health_url(),
        process_name = %config.process_name,
        interval_s = config.interval.as_secs(),
        timeout_s = config.timeout.as_secs(),
        "starting"
    );

    // Held until exit: dropping every sender reads as shutdown.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let signal_tx = shutdown_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("shutdown signal received");
        let _ = signal_tx.send(true);
    }) {
        warn!(error = %e, "failed to install signal handler");
    }

    let locator = ProcessLocator::new(filesystem(), &config.proc_path, &config.process_name)
        .with_duplicate_policy(config.duplicate_policy);
    let watchdog = Watchdog::new(locator, probe, registry.clone(), config.interval);
    let watchdog_task = tokio::spawn(watchdog.run(shutdown_rx.clone()));

    let app = router(AppState { registry }).layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    info!(%addr, "listening");

    let stop_requested = shutdown_rx.clone();
    let mut server_shutdown = shutdown_rx;
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });
    let mut watchdog_task = watchdog_task;

    // The watchdog only ends on shutdown; an early exit is fatal.
    tokio::select! {
        served = &mut server_task => {
            check_server(served);
            match watchdog_task.await {
                Ok(cycles) => info!(cycles, "stopped"),
                Err(e) => error!(error = %e, "watchdog task failed"),
            }
        }
        finished = &mut watchdog_task => {
            if !*stop_requested.borrow() {
                match finished {
                    Ok(cycles) => error!(cycles, "watchdog stopped unexpectedly"),
                    Err(e) => error!(error = %e, "watchdog task failed"),
                }
                process::exit(1);
            }
            check_server(server_task.await);
            if let Ok(cycles) = finished {
                info!(cycles, "stopped");
            }
        }
    }
    drop(shutdown_tx);
}

fn check_server(served: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match served {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "server error");
            process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "server task failed");
            process::exit(1);
        }
    }
}
