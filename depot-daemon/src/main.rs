// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use depot_daemon::config::Config;
use depot_daemon::error::DaemonError;
use depot_daemon::maintenance::Maintainer;
use depot_store_core::MetadataRegistry;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_PATH: &str = "depot.toml";

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "depot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("DEPOT_CONFIG") {
        Ok(path) => Config::from_file(&PathBuf::from(path))?,
        Err(_) => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Config::from_file(&path)?
            } else {
                Config::default()
            }
        }
    };

    // Every service type needs a metadata decoder before anything is served.
    MetadataRegistry::standard().verify_exhaustive()?;

    info!("Starting depot-daemon");
    info!("Database path: {}", config.db_path.display());
    info!("Storage path: {}", config.storage_path.display());
    info!("Upload path: {}", config.chunked_upload_path.display());
    info!(limits = ?config.limits, "Configured limits");

    let maintainer = Maintainer::open(&config).await?;

    tokio::select! {
        _ = maintainer.run(config.sweep_interval()) => {}
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
        }
    }

    info!("depot-daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
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
                error!("Failed to install SIGTERM handler: {e}");
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
}
