use std::sync::Arc;
use std::time::Duration;

use oidc_rp::{http_client, router, AppState, HandshakeController, RpSettings};
use oidc_rp_core::{init_tracing, ConfigProperties, RpConfig};
use oidc_rp_session::InMemorySessionStore;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let raw = RpConfig::load("dev")?;
    let missing = RpSettings::missing_keys(&raw);
    if !missing.is_empty() {
        for key in &missing {
            error!(key, env = %oidc_rp_core::config::env_var_for(key), "Missing required setting");
        }
        return Err(format!("missing required settings: {}", missing.join(", ")).into());
    }
    let config = raw.with_typed::<RpSettings>()?;
    let settings = config.typed().clone();

    let client = http_client(&settings)?;
    let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(
        settings.session_ttl_secs,
    )));
    let bind = settings.bind.clone();
    info!(
        profile = config.profile(),
        client_id = %settings.client_id,
        discovery = %settings.discovery_url,
        redirect_uri = %settings.redirect_uri(),
        "Starting relying party"
    );

    let controller = Arc::new(HandshakeController::new(settings, client));
    let app = router(AppState::new(controller, sessions));

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler: run until killed.
        std::future::pending::<()>().await;
    }
}
