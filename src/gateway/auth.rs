//! Authentication gate for the price monitor API.
//!
//! Two middleware layers cooperate:
//!
//! - [`certificate_middleware`] sits at the transport boundary. It collects
//!   the peer certificate (own TLS session or trusted proxy headers), runs
//!   extraction and validation exactly once, and records a
//!   [`CertificateOutcome`] on the request.
//! - [`auth_middleware`] turns that outcome into an [`AuthContext`] or a 401.
//!
//! [`require_authentication`] is a per-route guard that only inspects the
//! context, so handlers never repeat certificate work.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use super::listener::PeerCertificate;
use crate::Result;
use crate::mtls::{
    CertificateBundle, CertificateValidator, MtlsConfig, TransportMetadata, extract_certificate,
};

/// Client id attached when no certificate identity applies.
pub const ANONYMOUS_CLIENT_ID: &str = "anonymous";

/// Fallback message when a rejected certificate carries no reason.
const GENERIC_REJECTION: &str = "Invalid client certificate";

/// Per-request authentication facts, readable by downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    /// Whether the request passed the gate
    pub authenticated: bool,
    /// Identity of the caller
    pub client_id: String,
}

impl AuthContext {
    /// Context for requests that skip certificate checks.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            authenticated: true,
            client_id: ANONYMOUS_CLIENT_ID.to_string(),
        }
    }

    /// Context for a request with a trusted certificate.
    #[must_use]
    pub fn client(client_id: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            client_id: client_id.into(),
        }
    }
}

/// Certificate facts computed once per request at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateOutcome {
    /// No certificate was presented
    Absent,
    /// A certificate was presented and rejected
    Rejected(Option<String>),
    /// A certificate was presented and trusted
    Accepted(String),
}

/// Why the gate refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    /// No certificate on a protected path
    CertificateRequired,
    /// A certificate was presented but did not validate
    InvalidCertificate(String),
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        match self {
            Self::CertificateRequired => unauthorized_response(
                "client_certificate_required",
                "mTLS authentication requires a valid client certificate",
            ),
            Self::InvalidCertificate(message) => {
                unauthorized_response("authentication_failed", &message)
            }
        }
    }
}

/// Resolved gate configuration plus the validator.
#[derive(Debug)]
pub struct AuthGate {
    enabled: bool,
    validator: Option<CertificateValidator>,
    bypass_paths: Vec<String>,
    trust_forwarded_headers: bool,
}

impl AuthGate {
    /// Build the gate for `config`.
    ///
    /// With mTLS enabled the bundle must be loaded; an unusable CA aborts
    /// startup here rather than rejecting every request later.
    pub fn new(config: &MtlsConfig, bundle: &CertificateBundle) -> Result<Self> {
        let validator = if config.enabled {
            Some(CertificateValidator::new(bundle)?)
        } else {
            None
        };

        Ok(Self {
            enabled: config.enabled,
            validator,
            bypass_paths: config.bypass_paths.clone(),
            trust_forwarded_headers: config.trust_forwarded_headers,
        })
    }

    /// A gate that lets everything through as anonymous.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            validator: None,
            bypass_paths: Vec::new(),
            trust_forwarded_headers: false,
        }
    }

    /// Whether certificates are enforced.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `path` skips authentication (exact match).
    #[must_use]
    pub fn is_bypass_path(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| p == path)
    }

    /// Whether proxy-forwarded certificate headers are honoured.
    #[must_use]
    pub fn trusts_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }

    /// Extract and validate the certificate carried by `metadata`.
    #[must_use]
    pub fn evaluate(&self, metadata: &TransportMetadata) -> CertificateOutcome {
        let Some(validator) = &self.validator else {
            return CertificateOutcome::Absent;
        };
        let Some(pem) = extract_certificate(metadata) else {
            return CertificateOutcome::Absent;
        };

        let result = validator.validate_client_certificate(&pem);
        match (result.is_authenticated, result.client_id) {
            (true, Some(client_id)) => CertificateOutcome::Accepted(client_id),
            _ => CertificateOutcome::Rejected(result.error_message),
        }
    }

    /// Decide the request's fate from its path and certificate outcome.
    ///
    /// A missing outcome counts as no certificate.
    pub fn decide(
        &self,
        path: &str,
        outcome: Option<&CertificateOutcome>,
    ) -> std::result::Result<AuthContext, GateRejection> {
        if !self.is_enabled() || self.is_bypass_path(path) {
            return Ok(AuthContext::anonymous());
        }

        match outcome {
            None | Some(CertificateOutcome::Absent) => Err(GateRejection::CertificateRequired),
            Some(CertificateOutcome::Rejected(message)) => Err(GateRejection::InvalidCertificate(
                message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| GENERIC_REJECTION.to_string()),
            )),
            Some(CertificateOutcome::Accepted(client_id)) => Ok(AuthContext::client(client_id)),
        }
    }
}

/// Transport adapter: gather certificate metadata and validate it once.
///
/// Bypass-listed paths skip certificate work entirely. Proxy headers are
/// read only when the gate trusts them and the connection was not decrypted
/// by this process; a client talking TLS to us directly proves its identity
/// in the handshake or not at all.
pub async fn certificate_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !gate.is_enabled() || gate.is_bypass_path(request.uri().path()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<PeerCertificate>>()
        .map(|ConnectInfo(peer)| peer);

    let honour_headers = gate.trusts_forwarded_headers()
        && peer.is_none_or(PeerCertificate::may_carry_forwarded_certificate);

    let mut metadata = if honour_headers {
        TransportMetadata::from_forwarded_headers(request.headers())
    } else {
        TransportMetadata::new()
    };

    if let Some(der) = peer.and_then(|p| p.certificate.as_ref()) {
        metadata.set_peer_certificate(der.as_ref());
    }

    let outcome = gate.evaluate(&metadata);
    request.extensions_mut().insert(outcome);
    next.run(request).await
}

/// Gate middleware: attach an [`AuthContext`] or answer 401.
pub async fn auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let outcome = request.extensions().get::<CertificateOutcome>();

    match gate.decide(&path, outcome) {
        Ok(context) => {
            debug!(path = %path, client_id = %context.client_id, "Request authenticated");
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(rejection) => {
            warn!(path = %path, rejection = ?rejection, "Request rejected by mTLS gate");
            rejection.into_response()
        }
    }
}

/// Route guard: require `AuthContext::authenticated`.
pub async fn require_authentication(request: Request<Body>, next: Next) -> Response {
    let authenticated = request
        .extensions()
        .get::<AuthContext>()
        .is_some_and(|c| c.authenticated);

    if authenticated {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "Unauthenticated request to protected route");
        unauthorized_response("authentication_required", "Authentication required")
    }
}

/// Create a 401 Unauthorized response
fn unauthorized_response(error: &str, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": error,
            "message": message,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, middleware, routing::get};
    use tower::ServiceExt;

    fn enabled_gate(bypass: &[&str]) -> AuthGate {
        // decide() never touches the validator
        AuthGate {
            enabled: true,
            validator: None,
            bypass_paths: bypass.iter().map(|s| (*s).to_string()).collect(),
            trust_forwarded_headers: true,
        }
    }

    #[test]
    fn disabled_gate_is_anonymous_for_everything() {
        // GIVEN: mTLS off
        let gate = AuthGate::disabled();
        // WHEN: a rejected certificate is somehow present
        let outcome = CertificateOutcome::Rejected(Some("bad".into()));
        // THEN: still anonymous
        assert_eq!(gate.decide("/api/prices", Some(&outcome)), Ok(AuthContext::anonymous()));
        assert_eq!(gate.decide("/api/prices", None), Ok(AuthContext::anonymous()));
    }

    #[test]
    fn bypass_path_is_exact_match() {
        let gate = enabled_gate(&["/health"]);
        assert_eq!(gate.decide("/health", None), Ok(AuthContext::anonymous()));
        assert_eq!(
            gate.decide("/health/details", None),
            Err(GateRejection::CertificateRequired)
        );
    }

    #[test]
    fn missing_outcome_fails_closed() {
        let gate = enabled_gate(&[]);
        assert_eq!(gate.decide("/api", None), Err(GateRejection::CertificateRequired));
        assert_eq!(
            gate.decide("/api", Some(&CertificateOutcome::Absent)),
            Err(GateRejection::CertificateRequired)
        );
    }

    #[test]
    fn rejected_carries_validator_message_or_generic() {
        let gate = enabled_gate(&[]);
        assert_eq!(
            gate.decide(
                "/api",
                Some(&CertificateOutcome::Rejected(Some("Certificate has expired".into())))
            ),
            Err(GateRejection::InvalidCertificate("Certificate has expired".into()))
        );
        assert_eq!(
            gate.decide("/api", Some(&CertificateOutcome::Rejected(None))),
            Err(GateRejection::InvalidCertificate(GENERIC_REJECTION.into()))
        );
    }

    #[test]
    fn accepted_sets_client_id() {
        let gate = enabled_gate(&[]);
        assert_eq!(
            gate.decide("/api", Some(&CertificateOutcome::Accepted("alice".into()))),
            Ok(AuthContext::client("alice"))
        );
    }

    #[test]
    fn disabled_gate_evaluates_to_absent() {
        let metadata = TransportMetadata::new().with(crate::mtls::codec::SSL_CLIENT_CERT, "x");
        assert_eq!(AuthGate::disabled().evaluate(&metadata), CertificateOutcome::Absent);
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn guard_rejects_request_without_context() {
        // GIVEN: a guarded route with no gate in front of it
        let app = Router::new()
            .route("/secret", get(|| async { "ok" }))
            .route_layer(middleware::from_fn(require_authentication));
        // WHEN
        let response = app
            .oneshot(Request::get("/secret").body(Body::empty()).unwrap())
            .await
            .unwrap();
        // THEN
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "authentication_required");
    }

    #[tokio::test]
    async fn guard_passes_authenticated_context() {
        let app = Router::new()
            .route("/secret", get(|| async { "ok" }))
            .route_layer(middleware::from_fn(require_authentication))
            .layer(middleware::from_fn_with_state(
                Arc::new(AuthGate::disabled()),
                auth_middleware,
            ));
        let response = app
            .oneshot(Request::get("/secret").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    fn outcome_report_app(gate: AuthGate) -> Router {
        let report = |request: Request<Body>| async move {
            format!("{:?}", request.extensions().get::<CertificateOutcome>())
        };
        Router::new()
            .route("/health", get(report))
            .route("/api/prices", get(report))
            .layer(middleware::from_fn_with_state(
                Arc::new(gate),
                certificate_middleware,
            ))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn bypass_path_skips_certificate_evaluation() {
        // GIVEN: an enabled gate bypassing /health, and a forwarded header
        let app = outcome_report_app(enabled_gate(&["/health"]));
        let request = |path: &str| {
            Request::get(path)
                .header("x-ssl-cert", "junk")
                .body(Body::empty())
                .unwrap()
        };
        // WHEN
        let health = body_text(app.clone().oneshot(request("/health")).await.unwrap()).await;
        let prices = body_text(app.oneshot(request("/api/prices")).await.unwrap()).await;
        // THEN: no outcome recorded for the bypassed path
        assert_eq!(health, "None");
        assert_eq!(prices, "Some(Absent)");
    }

    #[tokio::test]
    async fn rejection_bodies_are_distinct() {
        let required = body_json(GateRejection::CertificateRequired.into_response()).await;
        let invalid =
            body_json(GateRejection::InvalidCertificate("nope".into()).into_response()).await;
        assert_eq!(required["error"], "client_certificate_required");
        assert_eq!(invalid["error"], "authentication_failed");
        assert_eq!(invalid["message"], "nope");
    }
}
