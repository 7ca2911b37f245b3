//! Builder for a whole forest of signers plus the CA bundles they feed.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use tracing::info;

use crate::builder::SignerSpec;
use crate::chains::CertificateChains;
use crate::error::{ChainError, Result};

/// Declares top-level signers and CA bundles, then completes them together.
#[derive(Debug, Clone, Default)]
pub struct CertificateChainsBuilder {
    signers: Vec<SignerSpec>,
    /// Bundle file to the signer paths contributing to it
    bundles: BTreeMap<PathBuf, Vec<Vec<String>>>,
}

impl CertificateChainsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_signers(mut self, signers: impl IntoIterator<Item = SignerSpec>) -> Self {
        self.signers.extend(signers);
        self
    }

    /// Have every signer at `signer_paths` contribute its certificate to the
    /// PEM bundle at `bundle_path`. Paths may address nested sub-CAs.
    ///
    /// ```rust,no_run
    /// # use certchains::CertificateChainsBuilder;
    /// let builder = CertificateChainsBuilder::new()
    ///     .with_ca_bundle("/var/lib/certs/ca-bundle.crt", [vec!["etcd-signer"], vec!["kube-signer", "client-ca"]]);
    /// ```
    #[must_use]
    pub fn with_ca_bundle<P, S>(
        mut self,
        bundle_path: impl Into<PathBuf>,
        signer_paths: impl IntoIterator<Item = P>,
    ) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bundles.entry(bundle_path.into()).or_default().extend(
            signer_paths
                .into_iter()
                .map(|path| path.into_iter().map(Into::into).collect::<Vec<String>>()),
        );
        self
    }

    pub fn signers(&self) -> &[SignerSpec] {
        &self.signers
    }

    /// Complete every signer, then fill the declared bundles.
    pub fn complete(self) -> Result<CertificateChains> {
        let mut names = HashSet::new();
        for signer in &self.signers {
            if !names.insert(signer.name()) {
                return Err(ChainError::NameClash {
                    name: signer.name().to_string(),
                });
            }
        }

        let mut signers = BTreeMap::new();
        for spec in self.signers {
            let signer = spec.complete()?;
            signers.insert(signer.name().to_string(), signer);
        }
        let mut chains = CertificateChains::new(signers);

        for (bundle, signer_paths) in self.bundles {
            for path in signer_paths {
                let segments: Vec<&str> = path.iter().map(String::as_str).collect();
                let signer = chains
                    .get_signer_mut(&segments)
                    .ok_or_else(|| ChainError::SignerNotFound { path: path.clone() })?;
                signer.add_to_bundles(std::slice::from_ref(&bundle))?;
            }
        }

        info!(signers = ?chains.signer_names(), "certificate chains complete");
        Ok(chains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::read_bundle;
    use crate::certinfo::CertificateInfo;
    use crate::request::{ClientCertificateRequest, ServingCertificateRequest, UserInfo};
    use chrono::Duration;
    use tempfile::TempDir;

    fn two_signers(tmp: &TempDir) -> CertificateChainsBuilder {
        CertificateChainsBuilder::new().with_signers([
            SignerSpec::new("s1", tmp.path().join("s1"), Duration::days(10)).with_client_certificates([
                ClientCertificateRequest::new(
                    "c1",
                    Duration::days(1),
                    UserInfo::new("alice").with_groups(["g1", "g2"]),
                ),
            ]),
            SignerSpec::new("s2", tmp.path().join("s2"), Duration::days(10)).with_serving_certificates([
                ServingCertificateRequest::new("srv1", Duration::days(1), ["h1", "h2"]),
            ]),
        ])
    }

    #[test]
    fn test_two_independent_signers() {
        let tmp = TempDir::new().unwrap();
        let chains = two_signers(&tmp).complete().unwrap();

        assert_eq!(chains.signer_names(), vec!["s1", "s2"]);

        let (cert, _) = chains.get_cert_key(&["s1", "c1"]).unwrap();
        let info = CertificateInfo::from_pem(&cert).unwrap();
        assert_eq!(info.common_name.as_deref(), Some("alice"));
        assert_eq!(info.organizations, vec!["g1", "g2"]);

        let (cert, _) = chains.get_cert_key(&["s2", "srv1"]).unwrap();
        let hostnames = CertificateInfo::from_pem(&cert).unwrap().hostnames();
        assert!(hostnames.contains("h1"));
        assert!(hostnames.contains("h2"));
    }

    #[test]
    fn test_recompletion_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let first = two_signers(&tmp).complete().unwrap();
        let second = two_signers(&tmp).complete().unwrap();

        for name in ["s1", "s2"] {
            assert_eq!(
                first.get_signer(&[name]).unwrap().signer_cert_pem().unwrap(),
                second.get_signer(&[name]).unwrap().signer_cert_pem().unwrap()
            );
        }
        assert_eq!(
            first.get_cert_key(&["s1", "c1"]).unwrap(),
            second.get_cert_key(&["s1", "c1"]).unwrap()
        );
    }

    #[test]
    fn test_top_level_name_clash_before_any_io() {
        let tmp = TempDir::new().unwrap();
        let err = CertificateChainsBuilder::new()
            .with_signers([
                SignerSpec::new("first", tmp.path().join("first"), Duration::days(1)),
                SignerSpec::new("dup", tmp.path().join("dup-a"), Duration::days(1)),
                SignerSpec::new("dup", tmp.path().join("dup-b"), Duration::days(1)),
            ])
            .complete()
            .unwrap_err();

        assert!(matches!(err, ChainError::NameClash { ref name } if name == "dup"));
        assert!(!tmp.path().join("first").exists());
        assert!(!tmp.path().join("dup-a").exists());
    }

    #[test]
    fn test_bundles_collect_nested_signers() {
        let tmp = TempDir::new().unwrap();
        let bundle = tmp.path().join("bundles").join("ca-bundle.crt");
        let chains = CertificateChainsBuilder::new()
            .with_signers([
                SignerSpec::new("a", tmp.path().join("a"), Duration::days(10))
                    .with_sub_cas([SignerSpec::new("a-sub", tmp.path().join("a-sub"), Duration::days(5))]),
                SignerSpec::new("b", tmp.path().join("b"), Duration::days(10)),
            ])
            .with_ca_bundle(&bundle, [vec!["a", "a-sub"], vec!["b"]])
            .complete()
            .unwrap();

        let subjects: Vec<String> = read_bundle(&bundle)
            .unwrap()
            .iter()
            .map(|cert| CertificateInfo::from_der(&cert.to_der().unwrap()).unwrap().common_name.unwrap())
            .collect();
        assert_eq!(subjects, vec!["a-sub", "b"]);
        assert_eq!(
            chains
                .get_signer(&["a", "a-sub"])
                .unwrap()
                .ca_bundle_paths()
                .collect::<Vec<_>>(),
            vec![bundle.as_path()]
        );
    }

    #[test]
    fn test_bundle_merge_survives_reruns() {
        let tmp = TempDir::new().unwrap();
        let bundle = tmp.path().join("ca-bundle.crt");
        let builder = || {
            CertificateChainsBuilder::new()
                .with_signers([SignerSpec::new("a", tmp.path().join("a"), Duration::days(10))])
                .with_ca_bundle(&bundle, [["a"]])
        };

        builder().complete().unwrap();
        builder().complete().unwrap();
        assert_eq!(read_bundle(&bundle).unwrap().len(), 1);

        // a second chain sharing the bundle path grows it
        CertificateChainsBuilder::new()
            .with_signers([SignerSpec::new("other", tmp.path().join("other"), Duration::days(10))])
            .with_ca_bundle(&bundle, [["other"]])
            .complete()
            .unwrap();
        assert_eq!(read_bundle(&bundle).unwrap().len(), 2);
    }

    #[test]
    fn test_bundle_with_unknown_signer() {
        let tmp = TempDir::new().unwrap();
        let err = CertificateChainsBuilder::new()
            .with_signers([SignerSpec::new("a", tmp.path().join("a"), Duration::days(10))])
            .with_ca_bundle(tmp.path().join("bundle.crt"), [vec!["a", "missing"]])
            .complete()
            .unwrap_err();

        assert!(matches!(err, ChainError::SignerNotFound { ref path } if path == &["a", "missing"]));
    }
}
