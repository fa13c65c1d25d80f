//! postmeeting server entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{Level, error, info, warn};

use postmeeting_core::init_tracing;
use postmeeting_server::cli::Cli;
use postmeeting_server::{
    LocalStore, ServerConfig, ServerError, ServerResult, build_state, router, spawn_background,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ServerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_tracing(&cli, &config) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server exited with error");
            ExitCode::FAILURE
        }
    }
}

fn setup_tracing(cli: &Cli, config: &ServerConfig) -> ServerResult<()> {
    let mut tracing_config = config.logging.tracing_config()?;
    if let Some(format) = cli.log_format {
        tracing_config = tracing_config.with_format(format);
    }
    if cli.debug {
        tracing_config = tracing_config.with_level(Level::DEBUG);
    }
    init_tracing(tracing_config).map_err(|e| ServerError::config(e.to_string()))
}

async fn run(cli: Cli, mut config: ServerConfig) -> ServerResult<()> {
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if cli.in_memory {
        config.server.in_memory = true;
    }
    config.server.check_exposure()?;
    if config.server.allow_remote {
        warn!(
            addr = %config.server.bind,
            "remote bind allowed, X-User-Id must come from a trusted proxy"
        );
    }

    let store = match config.store_path() {
        Some(path) => {
            info!(path = %path.display(), "opening store");
            LocalStore::open(path)?
        }
        None => {
            info!("using in-memory store");
            LocalStore::in_memory()
        }
    };

    let state = build_state(&config, Arc::new(store))?;
    let jobs = spawn_background(&config, &state);

    let listener = tokio::net::TcpListener::bind(config.server.bind).await?;
    info!(addr = %config.server.bind, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down background jobs");
    jobs.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
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
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
