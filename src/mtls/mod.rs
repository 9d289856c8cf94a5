//! Mutual TLS (mTLS) client authentication.
//!
//! # Architecture
//!
//! ```text
//! TCP connection
//!   → TLS handshake        (rustls, CA from the bundle as the only root)
//!   → TransportMetadata    (peer certificate or forwarded proxy headers)
//!   → extract_certificate  (canonical PEM, or none)
//!   → CertificateValidator (validity, issuer, signature, identity)
//!   → AuthenticationResult (consumed by the HTTP gate)
//! ```
//!
//! # Modules
//!
//! - [`config`]: YAML configuration (`MtlsConfig`)
//! - [`bundle`]: startup loading of PEM material (`CertificateBundle`)
//! - [`codec`]: certificate extraction from transport metadata
//! - [`validator`]: trust decision and diagnostics
//! - [`signature`]: CA key families and signature verification
//! - [`identity`]: client identity and DN rendering
//! - [`tls`]: rustls server configuration
//!
//! # Quick start
//!
//! ```yaml
//! mtls:
//!   enabled: true
//!   server_cert: "certs/server.crt"
//!   server_key:  "certs/server.key"
//!   ca_cert:     "certs/ca.crt"
//!   require_client_cert: true
//!   bypass_paths: ["/health"]
//! ```

pub mod bundle;
pub mod codec;
pub mod config;
pub mod identity;
pub mod signature;
pub mod tls;
pub mod validator;

pub use bundle::CertificateBundle;
pub use codec::{TransportMetadata, der_to_pem, extract_certificate};
pub use config::MtlsConfig;
pub use tls::build_server_config;
pub use validator::{
    AuthenticationResult, CertificateInfo, CertificateParseError, CertificateValidator,
    certificate_info, is_certificate_valid,
};
