//! Certificate identity extraction.
//!
//! Derives the client identity from a parsed X.509 certificate and renders
//! distinguished names in RFC 4514 form for logs and diagnostics.

use x509_parser::certificate::X509Certificate;
use x509_parser::x509::X509Name;

/// Identity reported when neither a Common Name nor a serial is available.
pub const UNKNOWN_CLIENT_ID: &str = "unknown";

/// Extract the client identity.
///
/// The subject Common Name is preferred, then the decimal serial number.
#[must_use]
pub fn client_id(cert: &X509Certificate<'_>) -> String {
    extract_cn(cert)
        .or_else(|| serial_decimal(cert))
        .unwrap_or_else(|| UNKNOWN_CLIENT_ID.to_owned())
}

/// Extract the CN attribute from the subject DN.
#[must_use]
pub fn extract_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

/// Serial number as a decimal string, `None` when the encoding is empty.
#[must_use]
pub fn serial_decimal(cert: &X509Certificate<'_>) -> Option<String> {
    if cert.tbs_certificate.raw_serial().is_empty() {
        return None;
    }
    Some(cert.tbs_certificate.serial.to_string())
}

/// A distinguished name reduced to attribute types and values, for
/// equality checks.
///
/// String values compare by content, so a `PrintableString` and a
/// `UTF8String` spelling the same text match. Non-string values compare by
/// their encoded bytes. RDN order matters; attribute order inside a
/// multi-valued RDN does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameKey(Vec<Vec<(String, AttributeValue)>>);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum AttributeValue {
    Text(String),
    Raw(Vec<u8>),
}

impl NameKey {
    /// Reduce a parsed name.
    #[must_use]
    pub fn from_name(name: &X509Name<'_>) -> Self {
        Self(
            name.iter()
                .map(|rdn| {
                    let mut attrs: Vec<_> = rdn
                        .iter()
                        .map(|attr| {
                            let value = match attr.as_str() {
                                Ok(s) => AttributeValue::Text(s.to_owned()),
                                Err(_) => AttributeValue::Raw(attr.attr_value().as_bytes().to_vec()),
                            };
                            (attr.attr_type().to_id_string(), value)
                        })
                        .collect();
                    attrs.sort();
                    attrs
                })
                .collect(),
        )
    }

    /// Whether `name` denotes the same distinguished name.
    #[must_use]
    pub fn matches(&self, name: &X509Name<'_>) -> bool {
        *self == Self::from_name(name)
    }
}

/// Render a distinguished name as an RFC 4514 string.
///
/// RDNs are emitted most-specific first (the reverse of their encoded
/// order), multi-valued RDNs are joined with `+`, and attribute values that
/// are not strings are rendered as `#` followed by hex.
#[must_use]
pub fn rfc4514(name: &X509Name<'_>) -> String {
    let rdns: Vec<String> = name
        .iter()
        .map(|rdn| {
            rdn.iter()
                .map(|attr| {
                    let oid = attr.attr_type().to_id_string();
                    let key = attribute_short_name(&oid).map_or(oid.clone(), str::to_owned);
                    let value = match attr.as_str() {
                        Ok(s) => escape_value(s),
                        Err(_) => format!("#{}", hex::encode(attr.attr_value().as_bytes())),
                    };
                    format!("{key}={value}")
                })
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect();

    rdns.into_iter().rev().collect::<Vec<_>>().join(",")
}

fn attribute_short_name(oid: &str) -> Option<&'static str> {
    Some(match oid {
        "2.5.4.3" => "CN",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.9" => "STREET",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "0.9.2342.19200300.100.1.1" => "UID",
        "0.9.2342.19200300.100.1.25" => "DC",
        _ => return None,
    })
}

/// Escape an attribute value per RFC 4514 section 2.4.
fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);

    for (i, c) in value.chars().enumerate() {
        match c {
            '"' | '+' | ',' | ';' | '<' | '>' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }

    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
