// ABOUTME: Server binary: load configuration, wire the components, serve the router
// ABOUTME: All policy lives in the library; this file only assembles and runs it
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use tollgate::clients::ClientRegistry;
use tollgate::config::ServerConfig;
use tollgate::logging::{self, LoggingConfig};
use tollgate::logout::{HttpLogoutDelivery, LogoutDispatcher};
use tollgate::oauth2::routes::{router, AppState};
use tollgate::oauth2::AuthorizationServer;
use tollgate::signing::{JwtSigner, TokenSigner};
use tollgate::store::{MemoryTokenStore, TokenStore};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging(&LoggingConfig::from_env())?;
    let config = Arc::new(ServerConfig::from_env()?);

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let registry = Arc::new(ClientRegistry::new(store.clone()));
    let signer: Arc<dyn TokenSigner> =
        Arc::new(JwtSigner::new(config.rs256_private_key_pem.clone()));
    let engine = Arc::new(AuthorizationServer::new(
        store.clone(),
        registry.clone(),
        signer.clone(),
        config.clone(),
    ));
    let delivery = Arc::new(HttpLogoutDelivery::new(Duration::from_secs(
        config.backchannel.request_timeout_secs,
    ))?);
    let dispatcher = Arc::new(LogoutDispatcher::new(
        store.clone(),
        signer,
        delivery,
        config.issuer_url.clone(),
    ));

    // Hourly sweep of expired grants and tokens
    let sweep_engine = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match sweep_engine.purge_expired(chrono::Utc::now()).await {
                Ok(purged) if purged > 0 => {
                    tracing::info!("Purged {} expired records", purged);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Expired-record sweep failed: {}", e),
            }
        }
    });

    let app = router(AppState {
        engine,
        dispatcher,
        registry,
        store,
        config: config.clone(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    tracing::info!("tollgate listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
