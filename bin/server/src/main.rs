use rolegate_access::{InMemorySessionStore, SessionStore};
use rolegate_server::{
    app,
    auth::{AppState, ProviderSlot, provider},
    config::ServerConfig,
};
use std::sync::Arc;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from file and environment
    let config = ServerConfig::load().expect("failed to load configuration");

    let tenant_span = tracing::info_span!("tenant", name = %config.tenant.name);
    run(config).instrument(tenant_span).await;
}

async fn run(config: ServerConfig) {
    tracing::info!(
        role_views = config.tenant.role_views,
        claims_strategy = ?config.oidc.claims_strategy,
        "Loaded configuration"
    );

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

    // Spawn periodic session cleanup task
    let cleanup_store = sessions.clone();
    let cleanup_interval_secs = config.session.cleanup_interval_seconds.max(1);
    tokio::spawn(
        async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(cleanup_interval_secs));
            loop {
                interval.tick().await;
                match cleanup_store.delete_expired().await {
                    Ok(count) if count > 0 => {
                        tracing::debug!(deleted_sessions = count, "Periodic session cleanup");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to cleanup expired sessions");
                    }
                }
            }
        }
        .in_current_span(),
    );

    // Discover the OIDC provider in the background; the listener does not wait
    let slot = Arc::new(ProviderSlot::pending());
    let relying_party = config
        .oidc
        .resolve(&config.server.default_post_logout_uri())
        .map_err(|e| e.to_string());
    let discovery_slot = slot.clone();
    let provider_config = config.provider.clone();
    tokio::spawn(
        async move {
            tracing::info!("Discovering OIDC provider...");
            provider::initialize(&discovery_slot, relying_party, &provider_config).await;
        }
        .in_current_span(),
    );

    let state = AppState::new(
        slot,
        sessions,
        config.session,
        config.tenant,
        config.rbac,
    );
    let app = app::router(state);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
