//! Certificate fixtures shared by the integration tests.
//!
//! Everything is generated with rcgen at test time. Validity windows are
//! fixed so tests can pin `now` through `CertificateValidator::validate_at`.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rcgen::string::PrintableString;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, DnValue, IsCa,
    Issuer, KeyPair, SerialNumber, SignatureAlgorithm,
};
use time::OffsetDateTime;

use price_monitor::mtls::{CertificateBundle, der_to_pem};

/// 2023-11-14T22:13:20Z
pub const NOT_BEFORE: i64 = 1_700_000_000;
/// Thirty days later.
pub const NOT_AFTER: i64 = NOT_BEFORE + 30 * DAY;

pub const CA_COMMON_NAME: &str = "Price Monitor Test CA";

const DAY: i64 = 24 * 60 * 60;

/// Chrono instant for a unix timestamp.
pub fn at(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap()
}

/// Midpoint of the fixed window.
pub fn inside_window() -> DateTime<Utc> {
    at(NOT_BEFORE + 15 * DAY)
}

fn offset(ts: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(ts).unwrap()
}

fn dn(pairs: &[(DnType, &str)]) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    for (ty, value) in pairs {
        dn.push(ty.clone(), *value);
    }
    dn
}

fn ca_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name = dn(&[
        (DnType::OrganizationName, "Price Monitor"),
        (DnType::CommonName, common_name),
    ]);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.not_before = offset(NOT_BEFORE - DAY);
    params.not_after = offset(Utc::now().timestamp() + 365 * DAY);
    params
}

/// A certificate authority able to sign leaves.
pub struct TestCa {
    pub cert: Certificate,
    pub key_pem: String,
    issuer: Issuer<'static, KeyPair>,
}

impl TestCa {
    /// P-256 CA with the default subject.
    pub fn new() -> Self {
        Self::with_algorithm(&rcgen::PKCS_ECDSA_P256_SHA256, CA_COMMON_NAME)
    }

    /// CA with a chosen key algorithm and Common Name.
    pub fn with_algorithm(alg: &'static SignatureAlgorithm, common_name: &str) -> Self {
        let key = KeyPair::generate_for(alg).unwrap();
        let key_pem = key.serialize_pem();

        let params = ca_params(common_name);
        let cert = params.self_signed(&key).unwrap();
        let issuer = Issuer::new(params, key);

        Self {
            cert,
            key_pem,
            issuer,
        }
    }

    /// CA whose own certificate spells its subject with PrintableString,
    /// while the leaves it issues name it with UTF8String.
    pub fn with_printable_subject() -> Self {
        let key = KeyPair::generate().unwrap();
        let key_pem = key.serialize_pem();

        let issuing = ca_params(CA_COMMON_NAME);
        let mut self_signed = issuing.clone();
        self_signed.distinguished_name = DistinguishedName::new();
        for (ty, value) in [
            (DnType::OrganizationName, "Price Monitor"),
            (DnType::CommonName, CA_COMMON_NAME),
        ] {
            self_signed.distinguished_name.push(
                ty,
                DnValue::PrintableString(PrintableString::try_from(value).unwrap()),
            );
        }

        let cert = self_signed.self_signed(&key).unwrap();
        let issuer = Issuer::new(issuing, key);

        Self {
            cert,
            key_pem,
            issuer,
        }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    /// Leaf with the given subject, signed by this CA, valid over the fixed window.
    pub fn issue(&self, subject: DistinguishedName, serial: Option<Vec<u8>>) -> String {
        self.issue_with_window(subject, serial, NOT_BEFORE, NOT_AFTER).0
    }

    /// Leaf plus its private key, valid over `[not_before, not_after]`.
    pub fn issue_with_window(
        &self,
        subject: DistinguishedName,
        serial: Option<Vec<u8>>,
        not_before: i64,
        not_after: i64,
    ) -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name = subject;
        params.serial_number = serial.map(SerialNumber::from);
        params.not_before = offset(not_before);
        params.not_after = offset(not_after);
        let cert = params.signed_by(&key, &self.issuer).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    /// Client certificate and key valid around the real current time.
    pub fn issue_current(&self, common_name: &str) -> (String, String) {
        let now = Utc::now().timestamp();
        self.issue_with_window(
            dn(&[(DnType::CommonName, common_name)]),
            None,
            now - DAY,
            now + 30 * DAY,
        )
    }

    /// Leaf with CN only.
    pub fn issue_client(&self, common_name: &str) -> String {
        self.issue(dn(&[(DnType::CommonName, common_name)]), None)
    }

    /// Leaf without a CN, serial 12345.
    pub fn issue_without_cn(&self) -> String {
        self.issue(
            dn(&[(DnType::OrganizationName, "Acme Pricing")]),
            Some(vec![0x30, 0x39]),
        )
    }

    /// Server certificate for `localhost`, plus its key.
    pub fn issue_server(&self) -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.distinguished_name = dn(&[(DnType::CommonName, "localhost")]);
        let cert = params.signed_by(&key, &self.issuer).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    /// Bundle trusting this CA.
    pub fn bundle(&self) -> CertificateBundle {
        let (server_cert, server_key) = self.issue_server();
        CertificateBundle::from_pem(server_cert, server_key, self.pem(), vec![])
    }
}

/// Self-signed certificate with the given CN and the fixed window.
pub fn self_signed(common_name: &str) -> String {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::default();
    params.distinguished_name = dn(&[(DnType::CommonName, common_name)]);
    params.not_before = offset(NOT_BEFORE);
    params.not_after = offset(NOT_AFTER);
    params.self_signed(&key).unwrap().pem()
}

/// DER bytes of the first certificate in `pem`.
pub fn pem_to_der(pem: &str) -> Vec<u8> {
    pem::parse(pem).unwrap().into_contents()
}

/// Same certificate with the last signature byte flipped.
pub fn tamper_signature(pem: &str) -> String {
    let mut der = pem_to_der(pem);
    let last = der.len() - 1;
    der[last] ^= 0x01;
    der_to_pem(&der)
}

/// PEM with newlines replaced by spaces, as nginx forwards it.
pub fn nginx_flatten(pem: &str) -> String {
    pem.trim().replace('\n', " ")
}
