//! Client certificate validation.
//!
//! Decides whether a presented PEM certificate is trusted and which client it
//! identifies. The checks run in a fixed order and stop at the first failure:
//!
//! 1. PEM / X.509 parsing
//! 2. validity window (`not_before <= now <= not_after`)
//! 3. issuer DN equals the CA subject DN, attribute by attribute
//! 4. signature over the TBS bytes verifies under the CA key
//! 5. identity: subject CN, else decimal serial
//!
//! Every failure becomes a rejected [`AuthenticationResult`]; nothing here
//! returns an error to the request path.

use aws_lc_rs::digest;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::FromDer;

use crate::mtls::bundle::CertificateBundle;
use crate::mtls::identity::{NameKey, client_id, rfc4514};
use crate::mtls::signature::{CaPublicKey, SignatureDigest, VerifyError};
use crate::{Error, Result};

const PEM_LABEL_CERTIFICATE: &str = "CERTIFICATE";

// ─────────────────────────────────────────────────────────────────────────────
// Result types
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of validating one client certificate.
///
/// `is_authenticated == true` always carries a `client_id` and no
/// `error_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticationResult {
    /// Whether the certificate is trusted
    pub is_authenticated: bool,
    /// Identity asserted by a trusted certificate
    pub client_id: Option<String>,
    /// Reason for rejection
    pub error_message: Option<String>,
}

impl AuthenticationResult {
    /// A trusted certificate identifying `client_id`.
    #[must_use]
    pub fn authenticated(client_id: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            client_id: Some(client_id.into()),
            error_message: None,
        }
    }

    /// A rejected certificate.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_authenticated: false,
            client_id: None,
            error_message: Some(message.into()),
        }
    }
}

/// Read-only facts about a certificate, computed without any trust decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    /// Subject DN (RFC 4514)
    pub subject: String,
    /// Issuer DN (RFC 4514)
    pub issuer: String,
    /// Serial number, decimal
    pub serial_number: String,
    /// Start of the validity window
    pub not_before: DateTime<Utc>,
    /// End of the validity window
    pub not_after: DateTime<Utc>,
    /// Whether the current time is inside the window
    pub is_valid: bool,
    /// Hex digest of the DER certificate, using its signature hash
    pub fingerprint: String,
}

/// Why a PEM string could not be turned into a certificate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificateParseError {
    /// No PEM block could be decoded
    #[error("input is not PEM encoded")]
    Pem,
    /// The PEM block is not a certificate
    #[error("unexpected PEM label '{0}'")]
    Label(String),
    /// The DER payload is not an X.509 certificate
    #[error("malformed X.509 certificate")]
    Der,
    /// A validity timestamp cannot be represented
    #[error("validity timestamp out of range")]
    Timestamp,
}

/// Rejection reasons; `Display` is the message returned to clients.
#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error("validation error: {0}")]
    Malformed(#[from] CertificateParseError),
    #[error("Certificate has expired")]
    OutsideValidity,
    #[error("Certificate not signed by trusted CA")]
    IssuerMismatch,
    #[error("Certificate not signed by trusted CA")]
    Signature(VerifyError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Validator
// ─────────────────────────────────────────────────────────────────────────────

/// The trusted CA, parsed once.
#[derive(Debug, Clone)]
struct TrustAnchor {
    subject_key: NameKey,
    subject: String,
    key: CaPublicKey,
}

/// Validates client certificates against the bundle's CA.
///
/// Immutable after construction and safe to share across requests.
#[derive(Debug, Clone)]
pub struct CertificateValidator {
    anchor: TrustAnchor,
}

impl CertificateValidator {
    /// Build a validator from a loaded bundle.
    ///
    /// Fails with [`Error::NotLoaded`] for the placeholder bundle, and with a
    /// configuration error when the CA certificate cannot be parsed or uses
    /// an unsupported key type.
    pub fn new(bundle: &CertificateBundle) -> Result<Self> {
        if !bundle.is_loaded() {
            return Err(Error::NotLoaded);
        }

        let anchor = with_certificate(bundle.ca_cert(), |ca, _| -> Result<TrustAnchor> {
            let key = CaPublicKey::from_spki(ca.public_key())?;
            if !ca.validity().is_valid() {
                warn!(subject = %rfc4514(ca.subject()), "CA certificate is outside its validity window");
            }
            Ok(TrustAnchor {
                subject_key: NameKey::from_name(ca.subject()),
                subject: rfc4514(ca.subject()),
                key,
            })
        })
        .map_err(|e| Error::Config(format!("Cannot parse CA certificate: {e}")))??;

        debug!(
            ca_subject = %anchor.subject,
            key_family = anchor.key.family(),
            "Trust anchor ready"
        );

        Ok(Self { anchor })
    }

    /// Subject DN of the trusted CA.
    #[must_use]
    pub fn trusted_ca_subject(&self) -> &str {
        &self.anchor.subject
    }

    /// Validate a client certificate at the current time.
    #[must_use]
    pub fn validate_client_certificate(&self, cert_pem: &str) -> AuthenticationResult {
        self.validate_at(cert_pem, Utc::now())
    }

    /// Validate a client certificate as of `now`.
    #[must_use]
    pub fn validate_at(&self, cert_pem: &str, now: DateTime<Utc>) -> AuthenticationResult {
        match self.check(cert_pem, now) {
            Ok(client_id) => {
                info!(client_id = %client_id, "Client certificate authenticated");
                AuthenticationResult::authenticated(client_id)
            }
            Err(rejection) => {
                warn!(reason = %rejection, detail = ?rejection, "Client certificate rejected");
                AuthenticationResult::rejected(rejection.to_string())
            }
        }
    }

    fn check(&self, cert_pem: &str, now: DateTime<Utc>) -> std::result::Result<String, Rejection> {
        with_certificate(cert_pem, |cert, _| {
            let (not_before, not_after) = validity_window(cert)?;
            if now < not_before || now > not_after {
                return Err(Rejection::OutsideValidity);
            }

            if !self.anchor.subject_key.matches(cert.issuer()) {
                debug!(
                    issuer = %rfc4514(cert.issuer()),
                    expected = %self.anchor.subject,
                    "Issuer does not match trusted CA"
                );
                return Err(Rejection::IssuerMismatch);
            }

            let digest = SignatureDigest::from_algorithm_oid(
                &cert.signature_algorithm.algorithm.to_id_string(),
            );
            self.anchor
                .key
                .verify(
                    digest,
                    cert.tbs_certificate.as_ref(),
                    cert.signature_value.data.as_ref(),
                )
                .map_err(Rejection::Signature)?;

            Ok(client_id(cert))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Diagnostics
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a certificate and derive its [`CertificateInfo`].
///
/// No trust decision is made.
pub fn certificate_info(cert_pem: &str) -> std::result::Result<CertificateInfo, CertificateParseError> {
    certificate_info_at(cert_pem, Utc::now())
}

/// [`certificate_info`] with `is_valid` evaluated at `now`.
pub fn certificate_info_at(
    cert_pem: &str,
    now: DateTime<Utc>,
) -> std::result::Result<CertificateInfo, CertificateParseError> {
    with_certificate(cert_pem, |cert, der| {
        let (not_before, not_after) = validity_window(cert)?;
        Ok(CertificateInfo {
            subject: rfc4514(cert.subject()),
            issuer: rfc4514(cert.issuer()),
            serial_number: cert.tbs_certificate.serial.to_string(),
            not_before,
            not_after,
            is_valid: not_before <= now && now <= not_after,
            fingerprint: fingerprint(cert, der),
        })
    })?
}

/// Whether the certificate's validity window contains the current time.
///
/// Unparseable input is simply not valid.
#[must_use]
pub fn is_certificate_valid(cert_pem: &str) -> bool {
    certificate_info(cert_pem).is_ok_and(|info| info.is_valid)
}

// ─────────────────────────────────────────────────────────────────────────────
// Private helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parse `cert_pem` and hand the certificate and its DER bytes to `f`.
fn with_certificate<T>(
    cert_pem: &str,
    f: impl FnOnce(&X509Certificate<'_>, &[u8]) -> T,
) -> std::result::Result<T, CertificateParseError> {
    let (_, pem) = parse_x509_pem(cert_pem.trim().as_bytes()).map_err(|e| {
        debug!(error = ?e, "PEM decoding failed");
        CertificateParseError::Pem
    })?;

    if pem.label != PEM_LABEL_CERTIFICATE {
        return Err(CertificateParseError::Label(pem.label.clone()));
    }

    let (_, cert) = X509Certificate::from_der(&pem.contents).map_err(|e| {
        debug!(error = ?e, "X.509 parsing failed");
        CertificateParseError::Der
    })?;

    Ok(f(&cert, &pem.contents))
}

fn validity_window(
    cert: &X509Certificate<'_>,
) -> std::result::Result<(DateTime<Utc>, DateTime<Utc>), CertificateParseError> {
    let validity = cert.validity();
    let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or(CertificateParseError::Timestamp)?;
    let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or(CertificateParseError::Timestamp)?;
    Ok((not_before, not_after))
}

/// Fingerprint with the hash named by the certificate's signature algorithm.
fn fingerprint(cert: &X509Certificate<'_>, der: &[u8]) -> String {
    let algorithm = match cert.signature_algorithm.algorithm.to_id_string().as_str() {
        "1.2.840.113549.1.1.5" | "1.3.14.3.2.29" | "1.2.840.10045.4.1" => {
            &digest::SHA1_FOR_LEGACY_USE_ONLY
        }
        "1.2.840.113549.1.1.12" | "1.2.840.10045.4.3.3" => &digest::SHA384,
        "1.2.840.113549.1.1.13" | "1.2.840.10045.4.3.4" => &digest::SHA512,
        _ => &digest::SHA256,
    };
    hex::encode(digest::digest(algorithm, der).as_ref())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
