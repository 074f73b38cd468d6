mod cli;
mod config;
mod error;
mod orchestrator;
mod sinks;
mod sources;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser as _;
use liquidity_engine::book::BookState;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sinks::jsonl::{JsonlEventSink, JsonlSnapshotSink};
use sources::binance_rest::BinanceRestFetcher;
use sources::binance_ws::BinanceWsSource;

/// How often the supervisor checks whether every monitored symbol's book
/// has gone `Stale` ("persistent external failure" path).
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let args = cli::Args::parse();

    let filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let app_config = match config::AppConfig::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "configuration error");
            std::process::exit(1);
        }
    };

    info!(symbols = ?args.symbols, exchange = %app_config.exchange, "liquidity-monitor starting");

    let interrupted = Arc::new(AtomicBool::new(false));
    let cancel = setup_signal_handlers(interrupted.clone());

    let exit_code = run(&args.symbols, app_config, cancel.clone()).await;

    let exit_code = if interrupted.load(Ordering::Relaxed) && exit_code == 0 {
        130
    } else {
        exit_code
    };
    std::process::exit(exit_code);
}

/// Wire up one pipeline per symbol and supervise them until shutdown or a
/// persistent external failure. Returns the process exit code (CLI
/// surface): 0 normal shutdown, 2 persistent external failure.
async fn run(symbols: &[String], app_config: config::AppConfig, cancel: CancellationToken) -> i32 {
    let fetcher = Arc::new(BinanceRestFetcher::new(&app_config.rest_base_url));

    let snapshot_sink = match JsonlSnapshotSink::open(&app_config.snapshot_sink_path, app_config.exchange.clone()).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!(error = %e, "failed to open snapshot sink");
            return 2;
        }
    };
    let event_sink = match JsonlEventSink::open(&app_config.event_sink_path, app_config.exchange.clone()).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!(error = %e, "failed to open event sink");
            return 2;
        }
    };

    let mut health_handles = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let source = BinanceWsSource::new(&app_config.ws_url);
        let health = orchestrator::spawn_symbol_pipeline(
            app_config.exchange.clone(),
            symbol.clone(),
            app_config.engine.clone(),
            source,
            fetcher.clone(),
            snapshot_sink.clone(),
            event_sink.clone(),
            cancel.clone(),
        );
        health_handles.push((symbol.clone(), health));
    }

    // Supervisor loop: wait for shutdown, or declare a persistent failure
    // once every monitored symbol's book has gone `Stale`.
    let mut poll = tokio::time::interval(HEALTH_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutdown requested, draining pipelines");
                tokio::time::sleep(Duration::from_secs(2)).await;
                return 0;
            }
            _ = poll.tick() => {
                let all_stale = health_handles
                    .iter()
                    .all(|(_, h)| h.state() == BookState::Stale);
                if all_stale && !health_handles.is_empty() {
                    warn!("every monitored symbol is stale, exiting");
                    cancel.cancel();
                    return 2;
                }
            }
        }
    }
}

/// Register SIGINT and SIGTERM handlers that trigger the returned token
/// and flag the run as operator-interrupted (exit code 130).
fn setup_signal_handlers(interrupted: Arc<AtomicBool>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    let flag = interrupted.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received SIGINT, shutting down");
        flag.store(true, Ordering::Relaxed);
        cancel_clone.cancel();
    });

    #[cfg(unix)]
    {
        let cancel_clone = cancel.clone();
        let flag = interrupted;
        tokio::spawn(async move {
            let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
            sig.recv().await;
            info!("received SIGTERM, shutting down");
            flag.store(true, Ordering::Relaxed);
            cancel_clone.cancel();
        });
    }

    cancel
}
