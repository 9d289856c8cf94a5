//! rustls server configuration built from a loaded certificate bundle.
//!
//! The handshake itself uses the bundle's CA as the only root, so a client
//! presenting a foreign certificate is refused before any HTTP is spoken.
//! The application-level check in [`crate::mtls::validator`] runs again on
//! whatever certificate the transport hands over.

use std::sync::Arc;

use rustls::{RootCertStore, ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use tracing::debug;

use crate::mtls::bundle::CertificateBundle;
use crate::{Error, Result};

/// ALPN protocols offered, HTTP/2 first.
const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Accepted protocol versions; nothing below TLS 1.2.
static PROTOCOL_VERSIONS: &[&SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

/// Build a TLS 1.2+ server configuration that requests client certificates.
///
/// Cipher suites are limited to forward-secret key exchange with AEAD
/// encryption.
///
/// With `require_client_cert` the handshake fails for clients that present
/// no certificate; otherwise such clients get through and are judged by the
/// HTTP gate.
pub fn build_server_config(
    bundle: &CertificateBundle,
    require_client_cert: bool,
) -> Result<ServerConfig> {
    if !bundle.is_loaded() {
        return Err(Error::NotLoaded);
    }

    let provider = Arc::new(restrict_cipher_suites(
        rustls::crypto::aws_lc_rs::default_provider(),
    ));

    let server_chain = parse_certificates(bundle.server_cert(), "server certificate")?;
    let server_key = PrivateKeyDer::from_pem_slice(bundle.server_key().as_bytes())
        .map_err(|e| Error::Tls(format!("Failed to parse server private key: {e}")))?;

    let mut roots = RootCertStore::empty();
    for ca in parse_certificates(bundle.ca_cert(), "CA certificate")? {
        roots
            .add(ca)
            .map_err(|e| Error::Tls(format!("Failed to add CA cert to trust store: {e}")))?;
    }

    let builder = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone());
    let builder = if require_client_cert {
        builder
    } else {
        builder.allow_unauthenticated()
    };
    let verifier = builder
        .build()
        .map_err(|e| Error::Tls(format!("Failed to build client verifier: {e}")))?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(PROTOCOL_VERSIONS)
        .map_err(|e| Error::Tls(format!("Unsupported protocol versions: {e}")))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(server_chain, server_key)
        .map_err(|e| Error::Tls(format!("TLS config error (cert/key mismatch?): {e}")))?;

    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    debug!(require_client_cert, "mTLS server config built");

    Ok(config)
}

/// Cipher suites offered by the configured provider, for startup logs.
#[must_use]
pub fn cipher_suite_names(config: &ServerConfig) -> Vec<String> {
    provider_suites(config.crypto_provider())
}

fn provider_suites(provider: &CryptoProvider) -> Vec<String> {
    provider
        .cipher_suites
        .iter()
        .map(|s| format!("{:?}", s.suite()))
        .collect()
}

fn restrict_cipher_suites(mut provider: CryptoProvider) -> CryptoProvider {
    provider.cipher_suites.retain(is_forward_secret_aead);
    provider
}

/// TLS 1.3 suites always qualify. TLS 1.2 suites need (EC)DHE key exchange
/// and an AEAD cipher; null, MD5 and export suites never match.
fn is_forward_secret_aead(suite: &SupportedCipherSuite) -> bool {
    match suite {
        SupportedCipherSuite::Tls13(_) => true,
        SupportedCipherSuite::Tls12(_) => {
            let name = format!("{:?}", suite.suite());
            let forward_secret = name.starts_with("TLS_ECDHE_") || name.starts_with("TLS_DHE_");
            let aead = name.contains("_GCM_") || name.contains("CHACHA20_POLY1305");
            forward_secret && aead
        }
    }
}

fn parse_certificates(pem: &str, what: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("Failed to parse {what}: {e}")))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!("No PEM blocks found in {what}")));
    }

    Ok(certs)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
