//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::State,
    http::{HeaderValue, header},
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

use super::auth::{
    AuthContext, AuthGate, auth_middleware, certificate_middleware, require_authentication,
};

/// Service name reported by `/health`.
pub const SERVICE_NAME: &str = "price-monitor";

const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    /// Authentication gate
    pub gate: Arc<AuthGate>,
}

impl AppState {
    /// State around a gate.
    #[must_use]
    pub fn new(gate: AuthGate) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }
}

/// Create the router
///
/// `extra` carries the business routes. They sit behind the gate, so
/// handlers can read [`AuthContext`] from request extensions; add
/// [`require_authentication`] as a `route_layer` to guard individual routes.
pub fn create_router(state: Arc<AppState>, extra: Router) -> Router {
    let gate = Arc::clone(&state.gate);
    let mtls_enabled = gate.is_enabled();

    let protected = Router::new()
        .route("/api/session", get(session_handler))
        .route_layer(middleware::from_fn(require_authentication));

    let router = Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .with_state(state)
        .merge(extra)
        // Layers run bottom-up: certificate facts first, then the gate.
        .layer(middleware::from_fn_with_state(Arc::clone(&gate), auth_middleware))
        .layer(middleware::from_fn_with_state(gate, certificate_middleware))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));

    let router = if mtls_enabled {
        router.layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS_VALUE),
        ))
    } else {
        router
    };

    router
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// GET /health - liveness, bypass-listed
async fn health_handler(
    State(state): State<Arc<AppState>>,
    context: Option<Extension<AuthContext>>,
) -> impl IntoResponse {
    let client_id = context.map(|Extension(c)| c.client_id);

    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "mtls_enabled": state.gate.is_enabled(),
        "client_id": client_id,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /api/session - who am I
async fn session_handler(Extension(context): Extension<AuthContext>) -> impl IntoResponse {
    Json(json!({
        "authenticated": context.authenticated,
        "client_id": context.client_id,
    }))
}
