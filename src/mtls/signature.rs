//! Signature verification against the trusted CA key.
//!
//! The CA key family is resolved once, when the trust anchor is built, into
//! a closed [`CaPublicKey`] enum. Each variant owns its verification
//! strategy; nothing is probed per request.

use aws_lc_rs::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::{Error, Result};

const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_ED25519: &str = "1.3.101.112";

/// Signature algorithms that name SHA-1 as their digest.
const SHA1_SIGNATURE_OIDS: &[&str] = &[
    "1.2.840.113549.1.1.5", // sha1WithRSAEncryption
    "1.3.14.3.2.29",        // sha1WithRSASignature (OIW)
    "1.2.840.10045.4.1",    // ecdsa-with-SHA1
];

/// Uncompressed SEC1 point lengths.
const P256_POINT_LEN: usize = 65;
const P384_POINT_LEN: usize = 97;

/// Digest used when checking a certificate signature.
///
/// Only SHA-1 is picked out of the declared algorithm; every other name,
/// including SHA-384 and SHA-512 variants, falls back to SHA-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureDigest {
    /// SHA-1, for certificates that explicitly declare it
    Sha1,
    /// SHA-256, the default
    Sha256,
}

impl SignatureDigest {
    /// Select the digest from a dotted signature-algorithm OID.
    #[must_use]
    pub fn from_algorithm_oid(oid: &str) -> Self {
        if SHA1_SIGNATURE_OIDS.contains(&oid) {
            Self::Sha1
        } else {
            Self::Sha256
        }
    }
}

/// The CA public key, tagged by family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaPublicKey {
    /// RSA, verified with PKCS#1 v1.5 padding. Holds the DER `RSAPublicKey`.
    Rsa(Vec<u8>),
    /// ECDSA on P-256. Holds the uncompressed point.
    EcdsaP256(Vec<u8>),
    /// ECDSA on P-384. Holds the uncompressed point.
    EcdsaP384(Vec<u8>),
    /// Ed25519. Holds the raw 32-byte key; the digest choice does not apply.
    Ed25519(Vec<u8>),
}

impl CaPublicKey {
    /// Resolve the key family from the CA's `SubjectPublicKeyInfo`.
    pub fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> Result<Self> {
        let algorithm = spki.algorithm.algorithm.to_id_string();
        let key = spki.subject_public_key.data.as_ref().to_vec();

        match algorithm.as_str() {
            OID_RSA_ENCRYPTION => Ok(Self::Rsa(key)),
            OID_EC_PUBLIC_KEY => match key.len() {
                P256_POINT_LEN => Ok(Self::EcdsaP256(key)),
                P384_POINT_LEN => Ok(Self::EcdsaP384(key)),
                len => Err(Error::Config(format!(
                    "Unsupported CA elliptic-curve key ({len}-byte point)"
                ))),
            },
            OID_ED25519 => Ok(Self::Ed25519(key)),
            other => Err(Error::Config(format!(
                "Unsupported CA key algorithm: {other}"
            ))),
        }
    }

    /// Short family name for logs.
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "rsa",
            Self::EcdsaP256(_) => "ecdsa-p256",
            Self::EcdsaP384(_) => "ecdsa-p384",
            Self::Ed25519(_) => "ed25519",
        }
    }

    /// Verify `signature` over `message` with this key.
    pub fn verify(
        &self,
        digest: SignatureDigest,
        message: &[u8],
        signature: &[u8],
    ) -> std::result::Result<(), VerifyError> {
        let (algorithm, key) = self.algorithm(digest)?;
        UnparsedPublicKey::new(algorithm, key)
            .verify(message, signature)
            .map_err(|_| VerifyError::BadSignature)
    }

    fn algorithm(
        &self,
        digest: SignatureDigest,
    ) -> std::result::Result<(&'static dyn VerificationAlgorithm, &[u8]), VerifyError> {
        use SignatureDigest::{Sha1, Sha256};

        let algorithm: &'static dyn VerificationAlgorithm = match (self, digest) {
            (Self::Rsa(_), Sha256) => &signature::RSA_PKCS1_2048_8192_SHA256,
            (Self::Rsa(_), Sha1) => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            (Self::EcdsaP256(_), Sha256) => &signature::ECDSA_P256_SHA256_ASN1,
            (Self::EcdsaP384(_), Sha256) => &signature::ECDSA_P384_SHA256_ASN1,
            (Self::Ed25519(_), _) => &signature::ED25519,
            (Self::EcdsaP256(_) | Self::EcdsaP384(_), Sha1) => {
                return Err(VerifyError::UnsupportedDigest(self.family()));
            }
        };

        let key = match self {
            Self::Rsa(k) | Self::EcdsaP256(k) | Self::EcdsaP384(k) | Self::Ed25519(k) => k,
        };

        Ok((algorithm, key))
    }
}

/// Why a signature did not verify.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// The signature bytes do not match the message under the CA key
    #[error("signature does not verify under the CA key")]
    BadSignature,
    /// The declared digest cannot be combined with the CA key family
    #[error("SHA-1 is not supported with {0} keys")]
    UnsupportedDigest(&'static str),
}
