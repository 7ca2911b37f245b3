//! Declarative signer specifications.
//!
//! A [`SignerSpec`] describes one CA node: where it lives, how long it is
//! valid, which sub-CAs it signs and which leaves it issues. Declaring is
//! pure; no key is generated and no file is touched until
//! [`SignerSpec::complete`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Duration;
use tracing::debug;

use crate::error::{ChainError, Result};
use crate::material::{ensure, CaMaterial, RootCaRequest};
use crate::request::{
    is_usable_validity, CertificateRequest, ClientCertificateRequest, PeerCertificateRequest,
    ServingCertificateRequest,
};
use crate::signer::CertificateSigner;

/// Builder for a certificate authority and everything it signs.
///
/// ```rust,no_run
/// use certchains::{ClientCertificateRequest, SignerSpec, UserInfo};
/// use chrono::Duration;
///
/// let signer = SignerSpec::new("admin-kubeconfig-signer", "/var/lib/certs/admin", Duration::days(3650))
///     .with_client_certificates([ClientCertificateRequest::new(
///         "admin-kubeconfig-client",
///         Duration::days(365),
///         UserInfo::new("system:admin").with_groups(["system:masters"]),
///     )])
///     .complete()?;
/// # Ok::<(), certchains::ChainError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerSpec {
    name: String,
    dir: PathBuf,
    validity: Duration,
    sub_cas: Vec<SignerSpec>,
    certificates: Vec<CertificateRequest>,
    ca_bundle_paths: Vec<PathBuf>,
}

impl SignerSpec {
    /// Start a signer with no sub-CAs and no leaves.
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, validity: Duration) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            validity,
            sub_cas: Vec::new(),
            certificates: Vec::new(),
            ca_bundle_paths: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub const fn validity(&self) -> Duration {
        self.validity
    }

    pub fn sub_cas(&self) -> &[SignerSpec] {
        &self.sub_cas
    }

    pub fn certificates(&self) -> &[CertificateRequest] {
        &self.certificates
    }

    #[must_use]
    pub fn with_sub_cas(mut self, sub_cas: impl IntoIterator<Item = SignerSpec>) -> Self {
        self.sub_cas.extend(sub_cas);
        self
    }

    #[must_use]
    pub fn with_client_certificates(
        mut self,
        requests: impl IntoIterator<Item = ClientCertificateRequest>,
    ) -> Self {
        self.certificates
            .extend(requests.into_iter().map(CertificateRequest::Client));
        self
    }

    #[must_use]
    pub fn with_serving_certificates(
        mut self,
        requests: impl IntoIterator<Item = ServingCertificateRequest>,
    ) -> Self {
        self.certificates
            .extend(requests.into_iter().map(CertificateRequest::Serving));
        self
    }

    #[must_use]
    pub fn with_peer_certificates(
        mut self,
        requests: impl IntoIterator<Item = PeerCertificateRequest>,
    ) -> Self {
        self.certificates
            .extend(requests.into_iter().map(CertificateRequest::Peer));
        self
    }

    /// Declare any leaf kind.
    #[must_use]
    pub fn with_certificates(mut self, requests: impl IntoIterator<Item = CertificateRequest>) -> Self {
        self.certificates.extend(requests);
        self
    }

    /// CA bundles this signer's certificate should be merged into.
    #[must_use]
    pub fn with_ca_bundle_paths<P: Into<PathBuf>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.ca_bundle_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Materialize this signer, its sub-CAs and its leaves.
    ///
    /// Existing valid material under the signer directories is reused, so
    /// completing the same specification again is cheap and changes nothing.
    pub fn complete(self) -> Result<CertificateSigner> {
        self.complete_with(None)
    }

    /// Complete with CA material already produced by a parent signer.
    pub(crate) fn complete_with(self, signer_ca: Option<CaMaterial>) -> Result<CertificateSigner> {
        self.validate()?;

        let ca = match signer_ca {
            Some(ca) => ca,
            None => {
                ensure(&RootCaRequest {
                    dir: &self.dir,
                    name: &self.name,
                    validity: self.validity,
                })
                .map_err(|e| ChainError::generation(&self.name, e))?
                .material
            }
        };
        debug!(signer = %self.name, dir = %self.dir.display(), "completing signer");

        let mut signer = CertificateSigner::new(self.name, self.dir, self.validity, ca);
        for sub_ca in self.sub_cas {
            signer.sign_sub_ca(sub_ca)?;
        }
        for request in self.certificates {
            signer.sign_certificate(request)?;
        }
        signer.add_to_bundles(&self.ca_bundle_paths)?;

        Ok(signer)
    }

    /// Checks that need no I/O: lifetimes of at least a second and unique sibling names.
    pub(crate) fn validate(&self) -> Result<()> {
        if !is_usable_validity(self.validity) {
            return Err(ChainError::InvalidValidity {
                name: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for sub_ca in &self.sub_cas {
            if !seen.insert(sub_ca.name.as_str()) {
                return Err(ChainError::NameClash {
                    name: sub_ca.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for request in &self.certificates {
            if !seen.insert(request.name()) {
                return Err(ChainError::NameClash {
                    name: request.name().to_string(),
                });
            }
            request.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certinfo::CertificateInfo;
    use crate::error::MaterialError;
    use crate::request::UserInfo;
    use tempfile::TempDir;

    fn client(name: &str, user: &str) -> ClientCertificateRequest {
        ClientCertificateRequest::new(name, Duration::days(1), UserInfo::new(user))
    }

    #[test]
    fn test_declaring_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("signer");
        let spec = SignerSpec::new("signer", &dir, Duration::days(1))
            .with_client_certificates([client("c1", "alice")])
            .with_sub_cas([SignerSpec::new("sub", dir.join("sub"), Duration::days(1))]);

        assert_eq!(spec.certificates().len(), 1);
        assert_eq!(spec.sub_cas().len(), 1);
        assert!(!dir.exists());
    }

    #[test]
    fn test_complete_lists_names_sorted() {
        let tmp = TempDir::new().unwrap();
        let signer = SignerSpec::new("test-signer-signer", tmp.path().join("general"), Duration::days(1))
            .with_serving_certificates([ServingCertificateRequest::new(
                "test-server",
                Duration::days(1),
                ["localhost", "127.0.0.1"],
            )])
            .with_client_certificates([client("test-client2", "test-user"), client("test-client", "test-user")])
            .with_sub_cas([
                SignerSpec::new("test-signer-b", tmp.path().join("b"), Duration::days(1)),
                SignerSpec::new("test-signer-a", tmp.path().join("a"), Duration::days(1)),
            ])
            .complete()
            .unwrap();

        assert_eq!(
            signer.certificate_names(),
            vec!["test-client", "test-client2", "test-server"]
        );
        assert_eq!(signer.sub_ca_names(), vec!["test-signer-a", "test-signer-b"]);
    }

    #[test]
    fn test_sub_ca_signed_by_direct_parent() {
        let tmp = TempDir::new().unwrap();
        let root = SignerSpec::new("root", tmp.path().join("root"), Duration::days(10))
            .with_sub_cas([SignerSpec::new("mid", tmp.path().join("mid"), Duration::days(5))
                .with_sub_cas([SignerSpec::new("leaf-ca", tmp.path().join("leaf-ca"), Duration::days(2))])])
            .complete()
            .unwrap();

        let mid = root.get_sub_ca("mid").unwrap();
        let leaf_ca = mid.get_sub_ca("leaf-ca").unwrap();
        assert_eq!(mid.info().issuer, root.info().subject);
        assert_eq!(leaf_ca.info().issuer, mid.info().subject);
        assert!(leaf_ca.info().is_ca);

        // consumers expect exactly one certificate in ca.crt
        let single = std::fs::read(tmp.path().join("leaf-ca").join("ca.crt")).unwrap();
        assert_eq!(pem::parse_many(&single).unwrap().len(), 1);
        let chain = std::fs::read(tmp.path().join("leaf-ca").join("ca-bundle.crt")).unwrap();
        assert_eq!(pem::parse_many(&chain).unwrap().len(), 3);
        let parsed = CertificateInfo::from_pem(&single).unwrap();
        assert_eq!(parsed.common_name.as_deref(), Some("leaf-ca"));
    }

    #[test]
    fn test_sibling_name_clash_before_io() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("signer");
        let err = SignerSpec::new("signer", &dir, Duration::days(1))
            .with_client_certificates([client("dup", "alice"), client("dup", "bob")])
            .complete()
            .unwrap_err();

        assert!(matches!(err, ChainError::NameClash { ref name } if name == "dup"));
        assert!(!dir.exists());
    }

    #[test]
    fn test_non_positive_validity_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = SignerSpec::new("signer", tmp.path().join("s"), Duration::zero())
            .complete()
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidValidity { .. }));
    }

    #[test]
    fn test_sub_second_validity_rejected_before_io() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("root");
        let err = SignerSpec::new("root", &dir, Duration::milliseconds(500))
            .complete()
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidValidity { ref name } if name == "root"));
        assert!(!dir.exists());

        let signer = SignerSpec::new("root", &dir, Duration::seconds(1)).complete().unwrap();
        let info = signer.info();
        assert!(info.not_before < info.not_after);
        assert!(info.rotate_at() < info.not_after);
    }

    #[test]
    fn test_oversized_validity_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = SignerSpec::new("root", tmp.path().join("root"), Duration::MAX)
            .complete()
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Generation {
                source: MaterialError::ValidityOutOfRange,
                ..
            }
        ));
    }

    #[test]
    fn test_recompletion_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let spec = SignerSpec::new("root", tmp.path().join("root"), Duration::days(30))
            .with_client_certificates([client("c1", "alice")])
            .with_sub_cas([SignerSpec::new("sub", tmp.path().join("sub"), Duration::days(10))]);

        let first = spec.clone().complete().unwrap();
        let second = spec.complete().unwrap();

        assert_eq!(first.signer_cert_pem().unwrap(), second.signer_cert_pem().unwrap());
        assert_eq!(first.get_cert_key("c1").unwrap(), second.get_cert_key("c1").unwrap());
        assert_eq!(
            first.get_sub_ca("sub").unwrap().signer_cert_pem().unwrap(),
            second.get_sub_ca("sub").unwrap().signer_cert_pem().unwrap()
        );
    }
}
