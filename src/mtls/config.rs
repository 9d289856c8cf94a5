//! mTLS configuration types.
//!
//! Defines the YAML-deserialisable configuration for mutual TLS: server
//! certificate paths, the single trusted CA, the optional directory of known
//! client certificates, and the request-gate bypass list.
//!
//! # Example YAML
//!
//! ```yaml
//! mtls:
//!   enabled: true
//!   server_cert: "/etc/price-monitor/tls/server.crt"
//!   server_key:  "/etc/price-monitor/tls/server.key"
//!   ca_cert:     "/etc/price-monitor/tls/ca.crt"
//!   require_client_cert: true
//!   bypass_paths: ["/health"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Name of the directory, next to the server certificate, scanned for known
/// client certificates when `client_cert_dir` is not set.
pub const DEFAULT_CLIENT_CERT_DIR: &str = "client-certs";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level mTLS config
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level mTLS configuration block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MtlsConfig {
    /// Enable mTLS.
    ///
    /// When `false` (default) no certificate file is read, the server listens
    /// on plain HTTP and every request is authenticated as `anonymous`.
    pub enabled: bool,

    /// Path to the PEM-encoded server certificate chain.
    pub server_cert: String,

    /// Path to the PEM-encoded server private key.
    pub server_key: String,

    /// Path to the PEM-encoded CA certificate used to verify client certs.
    pub ca_cert: String,

    /// When `true`, the TLS handshake itself rejects clients without a
    /// certificate signed by `ca_cert`. When `false` the certificate is
    /// requested but optional at the TLS layer; the request gate still
    /// enforces it for every non-bypassed path.
    pub require_client_cert: bool,

    /// Directory of individually named `.crt` / `.pem` client certificates.
    ///
    /// Defaults to `client-certs/` next to `server_cert`.
    pub client_cert_dir: Option<String>,

    /// Request paths that skip certificate authentication (exact match).
    pub bypass_paths: Vec<String>,

    /// Accept certificates forwarded by a TLS-terminating reverse proxy in
    /// the `ssl-client-cert` / `x-ssl-cert` headers.
    ///
    /// Off by default. When on, the server listens on plain TCP and expects
    /// the proxy to own TLS; headers are never honoured on connections the
    /// process decrypted itself.
    pub trust_forwarded_headers: bool,
}

impl Default for MtlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_cert: "certs/server.crt".to_string(),
            server_key: "certs/server.key".to_string(),
            ca_cert: "certs/ca.crt".to_string(),
            require_client_cert: true,
            client_cert_dir: None,
            bypass_paths: vec!["/health".to_string()],
            trust_forwarded_headers: false,
        }
    }
}

impl MtlsConfig {
    /// Check that every path needed for mTLS is set.
    ///
    /// A disabled config is always valid.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        for (field, value) in [
            ("server_cert", &self.server_cert),
            ("server_key", &self.server_key),
            ("ca_cert", &self.ca_cert),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!(
                    "mtls.{field} is required when mTLS is enabled"
                )));
            }
        }

        Ok(())
    }

    /// Directory scanned for known client certificates.
    #[must_use]
    pub fn client_cert_dir(&self) -> PathBuf {
        match &self.client_cert_dir {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(&self.server_cert)
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(DEFAULT_CLIENT_CERT_DIR),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
