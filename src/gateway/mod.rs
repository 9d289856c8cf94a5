//! HTTP host pipeline: TLS listener, authentication gate and router

pub mod auth;
pub mod listener;
mod router;
mod server;

pub use auth::{
    AuthContext, AuthGate, CertificateOutcome, auth_middleware, certificate_middleware,
    require_authentication,
};
pub use listener::{MtlsListener, PeerCertificate};
pub use router::{AppState, SERVICE_NAME, create_router};
pub use server::Server;
