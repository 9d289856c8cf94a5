//! Client certificate extraction from transport metadata.
//!
//! The peer certificate reaches the process in one of three shapes depending
//! on where TLS was terminated:
//!
//! | Field                  | Source                                  | Encoding                         |
//! |------------------------|-----------------------------------------|----------------------------------|
//! | `SSL_CLIENT_CERT`      | this process's own TLS session          | PEM, verbatim                    |
//! | `HTTP_SSL_CLIENT_CERT` | `ssl-client-cert` proxy header          | PEM, percent-encoded             |
//! | `HTTP_X_SSL_CERT`      | `x-ssl-cert` proxy header (nginx style) | PEM with newlines turned to spaces |
//!
//! Fields are tried in that order and the first non-empty one wins. Nothing
//! here judges trust; the output is handed to the validator.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use pem::{EncodeConfig, LineEnding, Pem};
use tracing::debug;

/// Field holding a verbatim PEM block.
pub const SSL_CLIENT_CERT: &str = "SSL_CLIENT_CERT";
/// Field holding a percent-encoded PEM block.
pub const HTTP_SSL_CLIENT_CERT: &str = "HTTP_SSL_CLIENT_CERT";
/// Field holding a PEM block whose newlines were replaced by spaces.
pub const HTTP_X_SSL_CERT: &str = "HTTP_X_SSL_CERT";

/// Proxy header mapped onto [`HTTP_SSL_CLIENT_CERT`].
pub const SSL_CLIENT_CERT_HEADER: &str = "ssl-client-cert";
/// Proxy header mapped onto [`HTTP_X_SSL_CERT`].
pub const X_SSL_CERT_HEADER: &str = "x-ssl-cert";

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";
const PEM_LINE_WIDTH: usize = 64;

/// Transport-level fields available for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMetadata {
    fields: BTreeMap<String, String>,
}

impl TransportMetadata {
    /// Empty metadata (anonymous, non-TLS client).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Map the certificate-forwarding proxy headers onto their fields.
    ///
    /// Headers that are not valid visible ASCII are ignored.
    #[must_use]
    pub fn from_forwarded_headers(headers: &HeaderMap) -> Self {
        let mut metadata = Self::new();
        for (header, field) in [
            (SSL_CLIENT_CERT_HEADER, HTTP_SSL_CLIENT_CERT),
            (X_SSL_CERT_HEADER, HTTP_X_SSL_CERT),
        ] {
            if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
                metadata.insert(field, value);
            }
        }
        metadata
    }

    /// Record the DER certificate presented on this process's own TLS session.
    pub fn set_peer_certificate(&mut self, der: &[u8]) {
        self.insert(SSL_CLIENT_CERT, der_to_pem(der));
    }
}

/// Extract a PEM certificate from transport metadata.
///
/// Returns `None` when no recognised field carries a certificate, which is
/// the normal outcome for anonymous clients.
#[must_use]
pub fn extract_certificate(metadata: &TransportMetadata) -> Option<String> {
    if let Some(raw) = non_blank(metadata.get(SSL_CLIENT_CERT)) {
        debug!(field = SSL_CLIENT_CERT, "Client certificate found");
        return Some(normalize_pem_block(raw));
    }

    if let Some(encoded) = non_blank(metadata.get(HTTP_SSL_CLIENT_CERT)) {
        debug!(field = HTTP_SSL_CLIENT_CERT, "Client certificate found");
        // Undecodable input is passed on as-is; the validator rejects it.
        let decoded = urlencoding::decode(encoded)
            .map_or_else(|_| encoded.to_string(), std::borrow::Cow::into_owned);
        return Some(normalize_pem_block(&decoded));
    }

    if let Some(flattened) = non_blank(metadata.get(HTTP_X_SSL_CERT)) {
        debug!(field = HTTP_X_SSL_CERT, "Client certificate found");
        return Some(rebuild_flattened_pem(flattened));
    }

    None
}

/// Encode DER certificate bytes as a canonical PEM block.
#[must_use]
pub fn der_to_pem(der: &[u8]) -> String {
    encode_canonical(&Pem::new(CERTIFICATE_TAG, der))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Canonicalise a PEM certificate block; anything `pem` cannot parse as a
/// certificate is returned trimmed but otherwise untouched.
fn normalize_pem_block(text: &str) -> String {
    match pem::parse(text.trim()) {
        Ok(block) if block.tag() == CERTIFICATE_TAG && !block.contents().is_empty() => {
            encode_canonical(&block)
        }
        _ => text.trim().to_string(),
    }
}

/// Rebuild a PEM block from the nginx-style single-line form.
///
/// The markers themselves contain spaces, so they are cut out before the
/// remaining spaces become line breaks. A bare base64 body gets the markers
/// added.
fn rebuild_flattened_pem(text: &str) -> String {
    let body = text.replace(PEM_BEGIN, " ").replace(PEM_END, " ");
    let lines: Vec<&str> = body.split_whitespace().collect();
    normalize_pem_block(&format!("{PEM_BEGIN}\n{}\n{PEM_END}\n", lines.join("\n")))
}

fn encode_canonical(block: &Pem) -> String {
    // `pem` wraps at 64 columns; only the line ending needs choosing.
    pem::encode_config(block, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
