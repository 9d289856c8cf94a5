//! Price Monitor API host
//!
//! Mutual-TLS client authentication for the price monitor dashboard API.
//!
//! # Features
//!
//! - **Certificate extraction**: own TLS session, URL-encoded and nginx-style proxy headers
//! - **Validation**: validity window, issuer DN, CA signature (RSA, ECDSA, Ed25519)
//! - **Gate**: per-request `AuthContext`, bypass list, JSON 401 responses
//! - **TLS**: rustls TLS 1.2/1.3 listener with mandatory or optional client certificates
//!
//! The core lives in [`mtls`]; [`gateway`] wires it into an axum server.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mtls;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Cannot install tracing subscriber: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Config(format!("Cannot install tracing subscriber: {e}")))?,
    }

    Ok(())
}
