//! Parsed view of an issued certificate.
//!
//! Walks and rotation analysis operate on [`CertificateInfo`] rather than on
//! raw DER, so visitors never need an X.509 parser of their own.

use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::extensions::GeneralName;

use crate::error::MaterialError;

/// Share of a certificate's lifetime after which it should be rotated, as
/// `ROTATION_NUMERATOR / ROTATION_DENOMINATOR`.
pub const ROTATION_NUMERATOR: i32 = 7;
pub const ROTATION_DENOMINATOR: i32 = 10;

/// Certificate metadata extracted from DER.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Full subject, RFC 4514 style
    pub subject: String,
    /// Full issuer, RFC 4514 style
    pub issuer: String,
    /// Serial number (colon separated hex)
    pub serial: String,
    /// First subject common name
    pub common_name: Option<String>,
    /// Subject organizations in encoded order
    pub organizations: Vec<String>,
    /// DNS subject alternative names
    pub dns_names: Vec<String>,
    /// IP subject alternative names
    pub ip_addresses: Vec<IpAddr>,
    /// Basic constraints CA flag
    pub is_ca: bool,
    /// Extended key usage allows TLS client authentication
    pub client_auth: bool,
    /// Extended key usage allows TLS server authentication
    pub server_auth: bool,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
}

impl CertificateInfo {
    /// Parse a single DER-encoded X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, MaterialError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der).map_err(|e| {
            MaterialError::CertParse {
                reason: e.to_string(),
            }
        })?;

        let subject = cert.subject();
        let common_name = subject
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);
        let organizations = subject
            .iter_organization()
            .filter_map(|o| o.as_str().ok())
            .map(str::to_string)
            .collect();

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push((*dns).to_string()),
                    GeneralName::IPAddress(raw) => {
                        if let Some(ip) = ip_from_octets(raw) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        let (client_auth, server_auth) = match cert.extended_key_usage() {
            Ok(Some(eku)) => (eku.value.client_auth, eku.value.server_auth),
            _ => (false, false),
        };
        let is_ca = matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca);

        Ok(Self {
            subject: subject.to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
            common_name,
            organizations,
            dns_names,
            ip_addresses,
            is_ca,
            client_auth,
            server_auth,
            not_before: asn1_to_utc(cert.validity().not_before),
            not_after: asn1_to_utc(cert.validity().not_after),
        })
    }

    /// Parse the first `CERTIFICATE` block of a PEM buffer.
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, MaterialError> {
        let blocks = pem::parse_many(pem_bytes).map_err(|e| MaterialError::CertParse {
            reason: e.to_string(),
        })?;
        let block = blocks
            .iter()
            .find(|p| p.tag() == "CERTIFICATE")
            .ok_or_else(|| MaterialError::CertParse {
                reason: "no CERTIFICATE block found".to_string(),
            })?;
        Self::from_der(block.contents())
    }

    /// Point in time after which the certificate should be replaced.
    ///
    /// Always strictly before `not_after` for a lifetime of at least one second.
    pub fn rotate_at(&self) -> DateTime<Utc> {
        let lifetime = self.not_after - self.not_before;
        self.not_before + lifetime * ROTATION_NUMERATOR / ROTATION_DENOMINATOR
    }

    /// Whether `at` lies within the validity window.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    /// All subject alternative names in canonical textual form.
    pub fn hostnames(&self) -> BTreeSet<String> {
        self.dns_names
            .iter()
            .cloned()
            .chain(self.ip_addresses.iter().map(ToString::to_string))
            .collect()
    }
}

fn ip_from_octets(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => <[u8; 4]>::try_from(raw).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(raw).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Convert an ASN.1 `GeneralizedTime` / `UTCTime` to `DateTime<Utc>`.
fn asn1_to_utc(t: x509_parser::time::ASN1Time) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn info_with_window(not_before: DateTime<Utc>, lifetime: Duration) -> CertificateInfo {
        CertificateInfo {
            subject: "CN=test".to_string(),
            issuer: "CN=test".to_string(),
            serial: "01".to_string(),
            common_name: Some("test".to_string()),
            organizations: Vec::new(),
            dns_names: vec!["b.example".to_string()],
            ip_addresses: vec!["127.0.0.1".parse().unwrap()],
            is_ca: false,
            client_auth: true,
            server_auth: false,
            not_before,
            not_after: not_before + lifetime,
        }
    }

    #[test]
    fn test_rotate_at_seventy_percent() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let info = info_with_window(start, Duration::days(100));
        assert_eq!(info.rotate_at(), start + Duration::days(70));
    }

    #[test]
    fn test_rotate_at_precedes_expiry_for_tiny_lifetimes() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let info = info_with_window(start, Duration::seconds(1));
        assert!(info.rotate_at() < info.not_after);
        assert!(info.rotate_at() > info.not_before);
    }

    #[test]
    fn test_hostnames_merge_dns_and_ip() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let info = info_with_window(start, Duration::days(1));
        let names: Vec<_> = info.hostnames().into_iter().collect();
        assert_eq!(names, vec!["127.0.0.1".to_string(), "b.example".to_string()]);
    }

    #[test]
    fn test_validity_window() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let info = info_with_window(start, Duration::days(1));
        assert!(info.is_valid_at(start + Duration::hours(1)));
        assert!(!info.is_valid_at(start + Duration::days(2)));
    }

    #[test]
    fn test_from_pem_rejects_non_certificates() {
        let err = CertificateInfo::from_pem(b"not pem at all").unwrap_err();
        assert!(matches!(err, MaterialError::CertParse { .. }));
    }

    #[test]
    fn test_info_serialization() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let info = info_with_window(start, Duration::days(1));
        let json = serde_json::to_string(&info).unwrap();
        let parsed: CertificateInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_ip_from_octets() {
        assert_eq!(ip_from_octets(&[10, 0, 0, 1]), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(ip_from_octets(&[1, 2, 3]), None);
    }
}
