use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lol_static_passthrough::api::riot::StaticDataApi;
use lol_static_passthrough::config;
use lol_static_passthrough::utils::display::DisplayFormatter;
use lol_static_passthrough::utils::logging::init_logging;
use lol_static_passthrough::{create_router, AppState, FreshnessCache, PassthroughService};
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "lol-static-passthrough", about = "Caching passthrough for LoL static data")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: String,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    let _log_guard = init_logging(Path::new(&config.log_dir))?;
    info!(config_path = %cli.config, "Starting LoL static data passthrough");

    let api = StaticDataApi::new(config.timeout()).context("failed to build HTTP client")?;
    let cache = FreshnessCache::new(Arc::new(api), config.staleness_policy())
        .with_serve_stale_on_error(config.cache.serve_stale_on_error);
    let service = Arc::new(PassthroughService::new(cache, config.endpoints()));
    let app = create_router(AppState {
        service: Arc::clone(&service),
    });

    let listen_addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    println!("{}", DisplayFormatter::new().format_banner(config.port, service.cache().policy()));
    info!(%listen_addr, "HTTP server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    let stats = service.cache().stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        refreshes = stats.refreshes,
        failures = stats.failures,
        "Shutting down"
    );
    Ok(())
}
