//! Completed signers.
//!
//! A [`CertificateSigner`] is the in-memory result of completing a
//! [`SignerSpec`]: it owns its CA material, its sub-CAs and the leaves it
//! issued, and can graft more of either after the fact.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Duration;
use tracing::{debug, warn};

use crate::builder::SignerSpec;
use crate::bundle::merge_into_bundle;
use crate::certinfo::CertificateInfo;
use crate::error::{owned_path, ChainError, Result};
use crate::material::{ensure, CaMaterial, LeafMaterial, LeafProfile, LeafRequest, RootCaRequest, SubCaRequest};
use crate::paths;
use crate::request::{
    hostname_set, CertificateRequest, ClientCertificateRequest, PeerCertificateRequest, ServingCertificateRequest,
};

/// A leaf together with the request it was issued for.
#[derive(Debug)]
struct SignedCertificate {
    request: CertificateRequest,
    material: LeafMaterial,
}

/// A certificate authority whose material exists on disk.
#[derive(Debug)]
pub struct CertificateSigner {
    name: String,
    dir: PathBuf,
    validity: Duration,
    ca: CaMaterial,
    sub_cas: BTreeMap<String, CertificateSigner>,
    certificates: BTreeMap<String, SignedCertificate>,
    ca_bundle_paths: BTreeSet<PathBuf>,
}

impl CertificateSigner {
    pub(crate) fn new(name: String, dir: PathBuf, validity: Duration, ca: CaMaterial) -> Self {
        Self {
            name,
            dir,
            validity,
            ca,
            sub_cas: BTreeMap::new(),
            certificates: BTreeMap::new(),
            ca_bundle_paths: BTreeSet::new(),
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

    /// Parsed view of the signer's own certificate.
    pub const fn info(&self) -> &CertificateInfo {
        self.ca.info()
    }

    /// Whether this signer is self-signed.
    pub fn is_root(&self) -> bool {
        self.ca.is_root()
    }

    /// PEM of the signer certificate alone.
    pub fn signer_cert_pem(&self) -> Result<Vec<u8>> {
        self.ca
            .cert_pem()
            .map_err(|e| ChainError::generation(&self.name, e))
    }

    /// PEM of the signer certificate followed by its parents.
    pub fn signer_chain_pem(&self) -> Result<Vec<u8>> {
        self.ca
            .chain_pem()
            .map_err(|e| ChainError::generation(&self.name, e))
    }

    /// Bundle files this signer contributes its certificate to.
    pub fn ca_bundle_paths(&self) -> impl Iterator<Item = &Path> {
        self.ca_bundle_paths.iter().map(PathBuf::as_path)
    }

    // ------------------------------------------------------------------------
    // Grafting
    // ------------------------------------------------------------------------

    /// Sign and complete a sub-CA under this signer.
    pub fn sign_sub_ca(&mut self, spec: SignerSpec) -> Result<()> {
        spec.validate()?;
        let material = {
            let request = SubCaRequest {
                parent: &self.ca,
                dir: spec.dir(),
                name: spec.name(),
                validity: spec.validity(),
            };
            let ensured = ensure(&request).map_err(|e| ChainError::generation(spec.name(), e))?;
            request
                .write_cert_file(&ensured.material)
                .map_err(|e| ChainError::generation(spec.name(), e))?;
            ensured.material
        };

        let sub_ca = spec.complete_with(Some(material))?;
        debug!(signer = %self.name, sub_ca = %sub_ca.name, "signed sub-CA");
        self.sub_cas.insert(sub_ca.name.clone(), sub_ca);
        Ok(())
    }

    /// Issue (or reuse) any kind of leaf certificate.
    pub fn sign_certificate(&mut self, request: impl Into<CertificateRequest>) -> Result<()> {
        let request = request.into();
        request.validate()?;

        let name = request.name().to_string();
        let leaf_dir = self.dir.join(&name);
        let material = match &request {
            CertificateRequest::Client(r) => self.ensure_leaf(
                &name,
                paths::client_cert_path(&leaf_dir),
                paths::client_key_path(&leaf_dir),
                r.meta.validity,
                LeafProfile::Client { user: &r.user },
            )?,
            CertificateRequest::Serving(r) => {
                let hostnames = hostname_set(&r.hostnames);
                self.ensure_leaf(
                    &name,
                    paths::serving_cert_path(&leaf_dir),
                    paths::serving_key_path(&leaf_dir),
                    r.meta.validity,
                    LeafProfile::Serving {
                        hostnames: &hostnames,
                    },
                )?
            }
            CertificateRequest::Peer(r) => {
                let hostnames = hostname_set(&r.hostnames);
                self.ensure_leaf(
                    &name,
                    paths::peer_cert_path(&leaf_dir),
                    paths::peer_key_path(&leaf_dir),
                    r.meta.validity,
                    LeafProfile::Peer {
                        user: &r.user,
                        hostnames: &hostnames,
                    },
                )?
            }
        };

        self.certificates
            .insert(name, SignedCertificate { request, material });
        Ok(())
    }

    pub fn sign_client_certificate(&mut self, request: ClientCertificateRequest) -> Result<()> {
        self.sign_certificate(request)
    }

    pub fn sign_serving_certificate(&mut self, request: ServingCertificateRequest) -> Result<()> {
        self.sign_certificate(request)
    }

    pub fn sign_peer_certificate(&mut self, request: PeerCertificateRequest) -> Result<()> {
        self.sign_certificate(request)
    }

    fn ensure_leaf(
        &self,
        name: &str,
        cert_path: PathBuf,
        key_path: PathBuf,
        validity: Duration,
        profile: LeafProfile<'_>,
    ) -> Result<LeafMaterial> {
        let request = LeafRequest {
            issuer: &self.ca,
            cert_path,
            key_path,
            validity,
            profile,
        };
        ensure(&request)
            .map(|ensured| ensured.material)
            .map_err(|e| ChainError::generation(name, e))
    }

    /// Merge this signer's certificate into each bundle and remember the paths.
    pub fn add_to_bundles(&mut self, bundle_paths: &[PathBuf]) -> Result<()> {
        for bundle in bundle_paths {
            merge_into_bundle(bundle, self.ca.certificate()).map_err(|source| ChainError::Bundle {
                bundle: bundle.clone(),
                signer: self.name.clone(),
                source,
            })?;
            self.ca_bundle_paths.insert(bundle.clone());
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Names of the leaves issued directly by this signer, sorted.
    pub fn certificate_names(&self) -> Vec<String> {
        self.certificates.keys().cloned().collect()
    }

    /// Certificate chain and private key PEM of a direct leaf.
    pub fn get_cert_key(&self, name: &str) -> Result<(Vec<u8>, Vec<u8>)> {
        let signed = self
            .certificates
            .get(name)
            .ok_or_else(|| ChainError::CertificateNotFound {
                signer: self.name.clone(),
                name: name.to_string(),
            })?;
        let cert = signed
            .material
            .cert_pem()
            .map_err(|e| ChainError::generation(name, e))?;
        let key = signed
            .material
            .key_pem()
            .map_err(|e| ChainError::generation(name, e))?;
        Ok((cert, key))
    }

    pub fn certificate_info(&self, name: &str) -> Option<&CertificateInfo> {
        self.certificates.get(name).map(|signed| signed.material.info())
    }

    /// Direct leaves in name order.
    pub fn certificates(&self) -> impl Iterator<Item = (&str, &CertificateInfo)> {
        self.certificates
            .iter()
            .map(|(name, signed)| (name.as_str(), signed.material.info()))
    }

    /// Names of the direct sub-CAs, sorted.
    pub fn sub_ca_names(&self) -> Vec<String> {
        self.sub_cas.keys().cloned().collect()
    }

    pub fn get_sub_ca(&self, name: &str) -> Option<&Self> {
        self.sub_cas.get(name)
    }

    pub fn get_sub_ca_mut(&mut self, name: &str) -> Option<&mut Self> {
        self.sub_cas.get_mut(name)
    }

    /// Direct sub-CAs in name order.
    pub fn sub_cas(&self) -> impl Iterator<Item = (&str, &Self)> {
        self.sub_cas.iter().map(|(name, signer)| (name.as_str(), signer))
    }

    /// An equivalent specification of this signer and everything below it.
    pub fn to_spec(&self) -> SignerSpec {
        SignerSpec::new(&self.name, &self.dir, self.validity)
            .with_sub_cas(self.sub_cas.values().map(Self::to_spec))
            .with_certificates(self.certificates.values().map(|c| c.request.clone()))
            .with_ca_bundle_paths(self.ca_bundle_paths.iter().cloned())
    }

    // ------------------------------------------------------------------------
    // Regeneration
    // ------------------------------------------------------------------------

    /// Throw away and re-issue material below this signer.
    ///
    /// An empty path regenerates the whole subtree, including the CA itself
    /// when this signer is a root. A single segment names a direct sub-CA or,
    /// failing that, a direct leaf. Longer paths descend through sub-CAs.
    pub fn regenerate(&mut self, path: &[&str]) -> Result<()> {
        match path {
            [] => self.regenerate_all(),
            [name] => match self.regenerate_sub_ca(name) {
                Err(e) if e.is_signer_not_found() => self.regenerate_certificate(name),
                other => other,
            },
            [first, rest @ ..] => match self.sub_cas.get_mut(*first) {
                Some(sub_ca) => sub_ca.regenerate(rest),
                None => Err(ChainError::SignerNotFound {
                    path: owned_path(path),
                }),
            },
        }
    }

    fn regenerate_all(&mut self) -> Result<()> {
        if self.is_root() {
            remove_dir(&self.dir)?;
            self.ca = ensure(&RootCaRequest {
                dir: &self.dir,
                name: &self.name,
                validity: self.validity,
            })
            .map_err(|e| ChainError::generation(&self.name, e))?
            .material;
            let bundles: Vec<PathBuf> = self.ca_bundle_paths.iter().cloned().collect();
            self.add_to_bundles(&bundles)?;
        }
        for name in self.sub_ca_names() {
            self.regenerate_sub_ca(&name)?;
        }
        for name in self.certificate_names() {
            self.regenerate_certificate(&name)?;
        }
        Ok(())
    }

    fn regenerate_sub_ca(&mut self, name: &str) -> Result<()> {
        let spec = match self.sub_cas.get(name) {
            Some(sub_ca) => sub_ca.to_spec(),
            None => {
                return Err(ChainError::SignerNotFound {
                    path: vec![name.to_string()],
                })
            }
        };
        remove_dir(spec.dir())?;
        self.sign_sub_ca(spec)
    }

    fn regenerate_certificate(&mut self, name: &str) -> Result<()> {
        let request = match self.certificates.get(name) {
            Some(signed) => signed.request.clone(),
            None => {
                return Err(ChainError::CertificateNotFound {
                    signer: self.name.clone(),
                    name: name.to_string(),
                })
            }
        };
        remove_dir(&self.dir.join(name))?;
        self.sign_certificate(request)
    }
}

fn remove_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            warn!(dir = %dir.display(), "removed material for regeneration");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ChainError::io(dir, e)),
    }
}
