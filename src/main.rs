use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loan_lead_form::config::Config;
use loan_lead_form::handlers::{self, AppState};

/// Main entry point for the application.
///
/// Initializes logging, loads configuration, builds the webhook and
/// geolocation clients, then serves the form and its API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loan_lead_form=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let app_state = Arc::new(AppState::new(config.clone())?);
    tracing::info!(
        "✓ Webhooks: {} ({:?}), {} ({:?})",
        config.webhooks.primary.name,
        config.webhooks.primary.mode,
        config.webhooks.secondary.name,
        config.webhooks.secondary.mode
    );

    // Lead payloads are tiny; 64KB is generous
    let api_routes =
        handlers::api_routes(&config).layer(RequestBodyLimitLayer::new(64 * 1024));

    // Rate limiting covers the form page too: every render may start a lookup
    let limited_routes = handlers::rate_limited(
        handlers::page_routes().merge(api_routes),
        config.rate_limit,
        config.trust_proxy_headers,
    )?;

    let app = Router::new()
        .merge(handlers::health_routes())
        .merge(limited_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
