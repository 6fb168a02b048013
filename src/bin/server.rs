//! LedgerKV Server Binary
//!
//! Replays the transaction log, then serves the HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use ledgerkv::config::{BackendConfig, SyncStrategy};
use ledgerkv::{Config, Engine};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

/// LedgerKV Server
#[derive(Parser, Debug)]
#[command(name = "ledgerkv-server")]
#[command(about = "HTTP key-value store with a replayable transaction log")]
#[command(version)]
struct Args {
    /// Transaction log backend
    #[arg(short, long, value_enum, default_value_t = BackendKind::File)]
    backend: BackendKind,

    /// Log file or database path
    #[arg(short, long, default_value = "./ledgerkv_data/transactions.log")]
    path: PathBuf,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Write queue capacity
    #[arg(short, long, default_value = "16")]
    queue_capacity: usize,

    /// fsync the log file every N appends (1 = every append)
    #[arg(long, default_value = "1")]
    sync_every: usize,

    /// Startup replay deadline in milliseconds
    #[arg(long, default_value = "60000")]
    replay_timeout_ms: u64,

    /// Shutdown drain deadline in milliseconds
    #[arg(long, default_value = "10000")]
    shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendKind {
    File,
    Sqlite,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledgerkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("LedgerKV Server v{}", ledgerkv::VERSION);
    tracing::info!("Backend: {:?} at {}", args.backend, args.path.display());
    tracing::info!("Listen address: {}", args.listen);

    let backend = match args.backend {
        BackendKind::File => BackendConfig::File {
            path: args.path.clone(),
            sync: match args.sync_every {
                0 | 1 => SyncStrategy::EveryWrite,
                count => SyncStrategy::EveryNEntries { count },
            },
        },
        BackendKind::Sqlite => BackendConfig::Sqlite {
            path: args.path.clone(),
            busy_timeout_ms: 5_000,
        },
    };

    // Build config from args
    let config = Config::builder()
        .backend(backend)
        .listen_addr(&args.listen)
        .queue_capacity(args.queue_capacity)
        .replay_timeout_ms(args.replay_timeout_ms)
        .shutdown_timeout_ms(args.shutdown_timeout_ms)
        .build();

    // Open engine (replays the log)
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        events = engine.replay_stats().events_replayed,
        "Engine initialized successfully"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let served = runtime.block_on(async {
        let listener = TcpListener::bind(config.listen_addr.as_str()).await?;
        ledgerkv::http::serve(listener, Arc::clone(&engine), shutdown_signal()).await
    });

    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
    }

    // Drain the transaction log before exiting
    if let Err(e) = engine.close() {
        tracing::error!("Failed to close transaction log: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
