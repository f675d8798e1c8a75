//! # appshelf-server
//!
//! Self-hosted store for Android apps.
//!
//! This binary provides:
//! - **App storage** keeping the metadata database, package files and icons
//!   consistent with each other, even across crashes and concurrent writers
//! - **Read API** (axum) for listing apps, fetching icons and downloading
//!   packages, optionally behind a shared password
//! - **Admin API** for adding, updating and deleting apps with a bearer token

mod api;
mod auth;
mod config;
mod error;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use appshelf_shared::ApkParser;
use appshelf_store::{AppStorage, StorageLayout};

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,appshelf_server=debug,appshelf_store=debug")
            }),
        )
        .init();

    info!("Starting Appshelf server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        instance = %config.instance_name,
        password_protected = config.user_password_hash.is_some(),
        admin_enabled = config.admin_token_hash.is_some(),
        "Instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Open the storage (creates the data root and heals leftovers)
    // -----------------------------------------------------------------------
    let layout = StorageLayout::new(&config.data_dir);
    let storage = tokio::task::spawn_blocking(move || {
        AppStorage::open(layout, Arc::new(ApkParser::default()))
    })
    .await?
    .context("failed to open app storage")?;

    let http_addr = config.http_addr;
    let app_state = AppState {
        storage: Arc::new(storage),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
