use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

use crate::config::{Config, RateLimit};
use crate::errors::{AppError, ResultExt};
use crate::geolocation::{client_ip, GeolocationService, PredictedStateCache};
use crate::models::{
    FieldCheckRequest, FieldCheckResponse, LeadSubmission, SubmissionOrigin, SubmitLeadRequest,
    SubmitLeadResponse,
};
use crate::overlay::Overlay;
use crate::settings::{resolve_settings, EffectiveSettings, SettingsQuery};
use crate::submission::{SubmissionContext, SubmissionPipeline};
use crate::validation::validate_field;
use crate::verification::{
    sanitize_code, DemoVerificationProvider, VerificationProvider, CODE_LENGTH, INVALID_CODE,
};
use crate::views::render_form_page;
use crate::webhooks::{LeadSink, WebhookClient};

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Delivers leads to the configured webhooks.
    pub sink: Arc<dyn LeadSink>,
    /// Client for the IP geolocation service.
    pub geolocation: GeolocationService,
    /// Per-visitor state/territory guesses.
    pub predicted_states: PredictedStateCache,
    /// One-time-code verification, only present when enabled.
    pub verifier: Option<Arc<dyn VerificationProvider>>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let sink = WebhookClient::new(config.webhook_timeout).context("Building lead sink")?;
        let geolocation = GeolocationService::new(
            config.geolocation_base_url.clone(),
            config.geolocation_timeout,
        )
        .context("Building geolocation service")?;
        let verifier: Option<Arc<dyn VerificationProvider>> = if config.verification_enabled {
            Some(Arc::new(DemoVerificationProvider::default()))
        } else {
            None
        };

        Ok(Self {
            config,
            sink: Arc::new(sink),
            geolocation,
            predicted_states: PredictedStateCache::default(),
            verifier,
        })
    }

    fn settings(&self, query: &SettingsQuery) -> EffectiveSettings {
        resolve_settings(&self.config.form_defaults, query, &self.config.palette)
    }

    fn client_ip(
        &self,
        headers: &HeaderMap,
        peer: Option<ConnectInfo<SocketAddr>>,
    ) -> Option<std::net::IpAddr> {
        client_ip(
            headers,
            peer.map(|ConnectInfo(addr)| addr),
            self.config.trust_proxy_headers,
        )
    }
}

/// The form page. Each render may start a geolocation lookup.
pub fn page_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(index))
}

/// Health check, never rate limited.
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

/// API routes. Verification routes are only mounted when enabled.
pub fn api_routes(config: &Config) -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/api/v1/leads", post(submit_lead))
        .route("/api/v1/leads/validate", post(check_field));

    if config.verification_enabled {
        router
            .route("/api/v1/verification/request", post(request_verification_code))
            .route("/api/v1/verification/verify", post(verify_verification_code))
    } else {
        router
    }
}

/// Every route, without rate limiting.
pub fn app(state: Arc<AppState>) -> Router {
    page_routes()
        .merge(health_routes())
        .merge(api_routes(&state.config))
        .with_state(state)
}

/// Wraps `router` in a per-client quota.
///
/// Clients are keyed by socket peer, or by proxy headers when those are
/// trusted, matching how the geolocation cache keys visitors.
pub fn rate_limited<S>(
    router: Router<S>,
    limit: RateLimit,
    trust_proxy_headers: bool,
) -> Result<Router<S>, AppError>
where
    S: Clone + Send + Sync + 'static,
{
    let invalid = || AppError::InternalError("Invalid rate limiter configuration".to_string());

    if trust_proxy_headers {
        let config = GovernorConfigBuilder::default()
            .per_second(limit.per_second)
            .burst_size(limit.burst_size)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(invalid)?;
        Ok(router.layer(GovernorLayer {
            config: Arc::new(config),
        }))
    } else {
        let config = GovernorConfigBuilder::default()
            .per_second(limit.per_second)
            .burst_size(limit.burst_size)
            .finish()
            .ok_or_else(invalid)?;
        Ok(router.layer(GovernorLayer {
            config: Arc::new(config),
        }))
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "loan-lead-form",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /
///
/// Renders the form with the effective settings and starts the visitor's
/// geolocation lookup in the background.
pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SettingsQuery>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Html<String> {
    let settings = state.settings(&query);
    let ip = state.client_ip(&headers, peer);

    let background = state.clone();
    tokio::spawn(async move {
        background
            .predicted_states
            .warm(&background.geolocation, ip)
            .await;
    });

    Html(render_form_page(
        &settings,
        state.config.overlay_message_delay,
    ))
}

/// POST /api/v1/leads
///
/// Validates the lead, delivers it to both webhooks and reports whether the
/// page should redirect. The page's query string is forwarded so settings
/// resolve exactly as they did when the form was rendered.
pub async fn submit_lead(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SettingsQuery>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<SubmitLeadRequest>,
) -> Result<Json<SubmitLeadResponse>, AppError> {
    let lead = request.form.validate().inspect_err(|errors| {
        tracing::info!("❌ Lead rejected: {} invalid field(s)", errors.len());
    })?;

    let settings = state.settings(&query);
    let submission = LeadSubmission::new(lead, &settings);

    let ip = state.client_ip(&headers, peer);
    let origin = SubmissionOrigin {
        submission_url: submission_url(&request, &headers),
        predicted_state: state.predicted_states.predicted_state(ip).await,
    };

    let mut pipeline = SubmissionPipeline::new(
        state.sink.clone(),
        state.config.webhooks.clone(),
        state.config.redirect.clone(),
        Overlay::new(state.config.overlay_message_delay),
    );

    pipeline
        .submit(
            submission,
            SubmissionContext {
                origin,
                has_top_frame: request.has_top_frame,
            },
        )
        .await?;

    pipeline
        .response(Instant::now())
        .map(Json)
        .ok_or_else(|| AppError::InternalError("Submission did not settle".to_string()))
}

/// Origin reported by the page, else the `Referer` header, else empty.
fn submission_url(request: &SubmitLeadRequest, headers: &HeaderMap) -> String {
    request
        .submission_url
        .clone()
        .filter(|url| !url.is_empty())
        .or_else(|| {
            headers
                .get(header::REFERER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

/// POST /api/v1/leads/validate
///
/// Checks a single field as the visitor leaves it.
pub async fn check_field(Json(request): Json<FieldCheckRequest>) -> Json<FieldCheckResponse> {
    let result = validate_field(request.field, &request.value);
    Json(FieldCheckResponse {
        field: request.field,
        valid: result.is_ok(),
        message: result.err().map(str::to_string),
    })
}

#[derive(Debug, Deserialize)]
pub struct VerificationCodeRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct VerificationCheckRequest {
    pub phone: String,
    #[serde(default)]
    pub code: String,
}

fn verifier(state: &AppState) -> Result<Arc<dyn VerificationProvider>, AppError> {
    state
        .verifier
        .clone()
        .ok_or_else(|| AppError::NotFound("Verification is not enabled".to_string()))
}

/// POST /api/v1/verification/request
pub async fn request_verification_code(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerificationCodeRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    verifier(&state)?.request_code(&request.phone).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "sent" }))))
}

/// POST /api/v1/verification/verify
pub async fn verify_verification_code(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerificationCheckRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let code = sanitize_code(&request.code);
    if code.len() != CODE_LENGTH {
        return Err(AppError::BadRequest(INVALID_CODE.to_string()));
    }

    let verified = verifier(&state)?.verify_code(&request.phone, &code).await?;
    Ok(Json(json!({ "verified": verified })))
}
