use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tollgate::clock::SystemClock;
use tollgate::config::{StoreBackend, TollgateConfig};
use tollgate::http::{build_router, AppState, HttpServer, SnapshotSource};
use tollgate::ratelimit::{CounterStore, MemoryStore, RateLimiter, RedisStore};

/// How often the in-process store drops expired counters.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about = "Rate-limited analytics API")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `server.http_addr`
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Redis URL, overrides `rate_limiting.redis_url`
    #[arg(long)]
    redis_url: Option<String>,

    /// Keep counters in process memory instead of Redis
    #[arg(long)]
    memory: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Tollgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TollgateConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.http_addr = listen;
    }
    if let Some(url) = args.redis_url {
        config.rate_limiting.redis_url = url;
    }
    if args.memory {
        config.rate_limiting.backend = StoreBackend::Memory;
    }
    info!(
        http_addr = %config.server.http_addr,
        backend = ?config.rate_limiting.backend,
        tiers = ?config.rate_limiting.tiers.as_slice(),
        "Configuration loaded"
    );

    let mut purge_task = None;
    let store: Arc<dyn CounterStore> = match config.rate_limiting.backend {
        StoreBackend::Redis => Arc::new(
            RedisStore::connect(
                &config.rate_limiting.redis_url,
                config.rate_limiting.store_timeout(),
            )
            .await?,
        ),
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new(Arc::new(SystemClock)));
            let sweeper = store.clone();
            purge_task = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(PURGE_INTERVAL);
                loop {
                    ticker.tick().await;
                    sweeper.purge_expired();
                }
            }));
            store
        }
    };

    let limiter = Arc::new(
        RateLimiter::new(store, config.rate_limiting.tiers.clone())
            .with_namespace(config.rate_limiting.namespace.clone()),
    );
    info!("Rate limiter initialized");

    let mut state = AppState::new(limiter);
    if let Some(path) = &config.reports.snapshot_path {
        state = state.with_reports(Arc::new(SnapshotSource::from_file(path)?));
    }

    let server = HttpServer::new(config.server.http_addr, build_router(state));
    server.serve_with_shutdown(shutdown_signal()).await?;

    if let Some(task) = purge_task {
        task.abort();
    }

    info!("Tollgate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
