//! Declarative chain layouts loaded from TOML.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::builder::SignerSpec;
use crate::chains_builder::CertificateChainsBuilder;
use crate::error::{ChainError, Result};
use crate::request::{ClientCertificateRequest, PeerCertificateRequest, ServingCertificateRequest, UserInfo};

/// A whole chain forest plus its bundles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainsLayout {
    /// Top-level signers.
    #[serde(default)]
    pub signers: Vec<SignerLayout>,

    /// Shared CA bundle files.
    #[serde(default)]
    pub bundles: Vec<BundleLayout>,
}

/// One signer and everything it issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerLayout {
    pub name: String,

    /// Directory holding the CA material, relative to the layout base.
    pub dir: PathBuf,

    pub validity_days: i64,

    /// Bundles this signer's certificate is merged into.
    #[serde(default)]
    pub ca_bundles: Vec<PathBuf>,

    #[serde(default)]
    pub client: Vec<ClientLayout>,

    #[serde(default)]
    pub serving: Vec<ServingLayout>,

    #[serde(default)]
    pub peer: Vec<PeerLayout>,

    /// Nested CAs signed by this one.
    #[serde(default)]
    pub sub_cas: Vec<SignerLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLayout {
    pub name: String,
    pub validity_days: i64,
    pub user: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingLayout {
    pub name: String,
    pub validity_days: i64,
    pub hostnames: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerLayout {
    pub name: String,
    pub validity_days: i64,
    pub user: String,
    #[serde(default)]
    pub groups: Vec<String>,
    pub hostnames: Vec<String>,
}

/// A bundle file and the signer paths feeding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLayout {
    pub path: PathBuf,
    pub signers: Vec<Vec<String>>,
}

impl ChainsLayout {
    /// Load a layout from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ChainError::io(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ChainError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ChainError::Config(e.to_string()))
    }

    /// Turn the layout into a chain builder, resolving relative directories
    /// and bundle paths against `base_dir`.
    pub fn into_builder(self, base_dir: &Path) -> Result<CertificateChainsBuilder> {
        let signers = self
            .signers
            .into_iter()
            .map(|signer| signer.into_spec(base_dir))
            .collect::<Result<Vec<_>>>()?;

        let mut builder = CertificateChainsBuilder::new().with_signers(signers);
        for bundle in self.bundles {
            builder = builder.with_ca_bundle(base_dir.join(bundle.path), bundle.signers);
        }
        Ok(builder)
    }
}

impl SignerLayout {
    fn into_spec(self, base_dir: &Path) -> Result<SignerSpec> {
        let validity = validity_from_days(&self.name, self.validity_days)?;

        let clients = self
            .client
            .into_iter()
            .map(|c| {
                Ok(ClientCertificateRequest::new(
                    &c.name,
                    validity_from_days(&c.name, c.validity_days)?,
                    UserInfo::new(c.user).with_groups(c.groups),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let serving = self
            .serving
            .into_iter()
            .map(|s| {
                Ok(ServingCertificateRequest::new(
                    &s.name,
                    validity_from_days(&s.name, s.validity_days)?,
                    s.hostnames,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let peers = self
            .peer
            .into_iter()
            .map(|p| {
                Ok(PeerCertificateRequest::new(
                    &p.name,
                    validity_from_days(&p.name, p.validity_days)?,
                    UserInfo::new(p.user).with_groups(p.groups),
                    p.hostnames,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let sub_cas = self
            .sub_cas
            .into_iter()
            .map(|sub_ca| sub_ca.into_spec(base_dir))
            .collect::<Result<Vec<_>>>()?;

        Ok(SignerSpec::new(self.name, base_dir.join(self.dir), validity)
            .with_sub_cas(sub_cas)
            .with_client_certificates(clients)
            .with_serving_certificates(serving)
            .with_peer_certificates(peers)
            .with_ca_bundle_paths(self.ca_bundles.into_iter().map(|p| base_dir.join(p))))
    }
}

fn validity_from_days(name: &str, days: i64) -> Result<Duration> {
    if days <= 0 {
        return Err(ChainError::Config(format!(
            "{name}: validity_days must be positive, got {days}"
        )));
    }
    Duration::try_days(days).ok_or_else(|| ChainError::Config(format!("{name}: validity_days {days} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ETCD_LAYOUT: &str = r#"
[[signers]]
name = "etcd-signer"
dir = "etcd-signer"
validity_days = 3650
ca_bundles = ["ca-bundle/etcd-ca.crt"]

  [[signers.client]]
  name = "apiserver-etcd-client"
  validity_days = 365
  user = "etcd"
  groups = ["etcd"]

  [[signers.serving]]
  name = "etcd-serving"
  validity_days = 365
  hostnames = ["localhost", "127.0.0.1"]

  [[signers.peer]]
  name = "etcd-peer"
  validity_days = 365
  user = "system:etcd-peer:etcd-client"
  groups = ["system:etcd-peers"]
  hostnames = ["localhost"]

  [[signers.sub_cas]]
  name = "nested"
  dir = "etcd-signer-nested"
  validity_days = 1825

[[bundles]]
path = "ca-bundle/ca-bundle.crt"
signers = [["etcd-signer"], ["etcd-signer", "nested"]]
"#;

    #[test]
    fn test_parse_layout() {
        let layout = ChainsLayout::from_toml(ETCD_LAYOUT).unwrap();
        assert_eq!(layout.signers.len(), 1);

        let signer = &layout.signers[0];
        assert_eq!(signer.name, "etcd-signer");
        assert_eq!(signer.client[0].groups, vec!["etcd"]);
        assert_eq!(signer.serving[0].hostnames, vec!["localhost", "127.0.0.1"]);
        assert_eq!(signer.peer[0].user, "system:etcd-peer:etcd-client");
        assert_eq!(signer.sub_cas[0].name, "nested");
        assert!(signer.sub_cas[0].client.is_empty());
        assert_eq!(layout.bundles[0].signers[1], vec!["etcd-signer", "nested"]);
    }

    #[test]
    fn test_toml_round_trip() {
        let layout = ChainsLayout::from_toml(ETCD_LAYOUT).unwrap();
        let again = ChainsLayout::from_toml(&layout.to_toml().unwrap()).unwrap();
        assert_eq!(again, layout);
    }

    #[test]
    fn test_empty_layout() {
        let layout = ChainsLayout::from_toml("").unwrap();
        assert!(layout.signers.is_empty());
        assert!(layout.bundles.is_empty());
    }

    #[test]
    fn test_malformed_layout() {
        let err = ChainsLayout::from_toml("[[signers]]\nname = 3").unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }

    #[test]
    fn test_non_positive_validity() {
        let layout = ChainsLayout::from_toml(&ETCD_LAYOUT.replace("validity_days = 1825", "validity_days = 0")).unwrap();
        let err = layout.into_builder(Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, ChainError::Config(ref msg) if msg.contains("nested")));
    }

    #[test]
    fn test_builder_resolves_against_base_dir() {
        let tmp = TempDir::new().unwrap();
        let layout_path = tmp.path().join("chains.toml");
        std::fs::write(&layout_path, ETCD_LAYOUT).unwrap();

        let chains = ChainsLayout::load(&layout_path)
            .unwrap()
            .into_builder(tmp.path())
            .unwrap()
            .complete()
            .unwrap();

        let signer = chains.get_signer(&["etcd-signer"]).unwrap();
        assert_eq!(signer.dir(), tmp.path().join("etcd-signer"));
        assert_eq!(
            signer.certificate_names(),
            vec!["apiserver-etcd-client", "etcd-peer", "etcd-serving"]
        );
        assert!(chains.get_signer(&["etcd-signer", "nested"]).is_some());
        assert!(tmp.path().join("ca-bundle/etcd-ca.crt").exists());
        assert_eq!(
            crate::bundle::read_bundle(&tmp.path().join("ca-bundle/ca-bundle.crt"))
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = ChainsLayout::load(Path::new("/nonexistent/chains.toml")).unwrap_err();
        assert!(matches!(err, ChainError::Io { .. }));
    }
}
