//! imgrender - resized images on demand.
//!
//! This binary starts the HTTP server (or resets the store) and configures
//! all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgrender::{
    config::{Cli, Command, InitDbConfig, ServeConfig},
    render::{RenderOptions, RenderService},
    server::{create_router, RouterConfig},
    store::LocalImageStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::InitDb(config) => run_init_db(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("imgrender v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Database: {}", config.database.display());
    info!("  Files: {}", config.files_dir.display());
    info!("  Cache TTL: {}s", config.cache_ttl);
    if config.workers == 0 {
        info!("  Workers: one per CPU");
    } else {
        info!("  Workers: {}", config.workers);
    }
    if config.cache_ttl == 0 {
        warn!("  Cache TTL is 0: every request renders a new image");
    }

    let store = LocalImageStore::new(&config.database, &config.files_dir);
    if let Err(e) = store.initialize().await {
        error!("Failed to initialize store: {}", e);
        return ExitCode::FAILURE;
    }
    match store.count().await {
        Ok(0) => warn!("  Store is empty: image requests return 404 until an upload"),
        Ok(n) => info!("  Store holds {} image(s)", n),
        Err(e) => {
            error!("Failed to read store: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let service = Arc::new(RenderService::with_options(
        store,
        RenderOptions {
            cache_ttl: config.ttl(),
            workers: config.workers,
        },
    ));

    let router = create_router(Arc::clone(&service), build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/health", addr);
    info!("    curl -F file=@cat.png http://{}/images", addr);
    info!("    curl -o out.png http://{}/images/640x480?mode=auto", addr);
    info!("");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    service.shutdown();

    if let Err(e) = result {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "imgrender=debug,tower_http=debug"
    } else {
        "imgrender=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_chunk_size(config.chunk_size)
        .with_max_upload_bytes(config.max_upload_bytes);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Init-DB Command
// =============================================================================

async fn run_init_db(config: InitDbConfig) -> ExitCode {
    init_logging(config.verbose);

    let store = LocalImageStore::new(&config.database, &config.files_dir);
    match store.reset().await {
        Ok(removed) => {
            info!(
                "Initialized {} (removed {} file(s) from {})",
                config.database.display(),
                removed,
                config.files_dir.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            ExitCode::FAILURE
        }
    }
}
