//! `switchboard serve`: run the gateway until interrupted.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use switchboard_core::{GatewayConfig, HttpRegistryClient, OAuthCoordinator, WorkspaceStore};
use switchboard_server::AppState;
use switchboard_storage::JsonConfigStore;
use tracing::{info, warn};

/// Directory holding workspace records.
pub fn resolve_data_dir(config: &GatewayConfig) -> anyhow::Result<PathBuf> {
    config
        .data_dir()
        .context("Could not determine a data directory; pass --data-dir")
}

pub async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let data_dir = resolve_data_dir(&config)?;
    info!(path = %data_dir.display(), "Using data directory");

    let redirect_uri = config.redirect_uri();
    let coordinator = Arc::new(OAuthCoordinator::new(redirect_uri.clone()));
    let mut store = WorkspaceStore::bootstrap(
        Arc::new(JsonConfigStore::new(&data_dir)),
        coordinator,
        config.settings(),
    )
    .await
    .context("Failed to load workspaces")?;

    if let Some(url) = &config.registry_url {
        match HttpRegistryClient::new(url.clone()) {
            Ok(registry) => store = store.with_registry(Arc::new(registry)),
            Err(e) => warn!(url = %url, error = %e, "Registry disabled"),
        }
    }

    let store = Arc::new(store);
    let mut state = AppState::new(store.clone());
    if let Some(key) = &config.api_key {
        state = state.with_api_key(key.clone());
    }
    let app = switchboard_server::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("Failed to bind {}", config.address))?;
    let address = listener.local_addr()?;

    println!();
    println!("  switchboard {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  Listening on:      http://{address}");
    println!("  Public URL:        {}", config.public_url());
    println!("  OAuth redirect:    {redirect_uri}");
    println!();
    println!("  Press Ctrl+C to stop the server");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
