//! The chain forest: lookups, walks and regeneration across top-level signers.

use std::collections::BTreeMap;

use crate::certinfo::CertificateInfo;
use crate::error::{owned_path, ChainError, Result, VisitError};
use crate::signer::CertificateSigner;

/// Completed top-level signers keyed by name.
#[derive(Debug, Default)]
pub struct CertificateChains {
    signers: BTreeMap<String, CertificateSigner>,
}

impl CertificateChains {
    pub(crate) const fn new(signers: BTreeMap<String, CertificateSigner>) -> Self {
        Self { signers }
    }

    /// Top-level signer names, sorted.
    pub fn signer_names(&self) -> Vec<String> {
        self.signers.keys().cloned().collect()
    }

    /// Resolve a signer by descending through sub-CAs one segment at a time.
    ///
    /// Returns `None` as soon as a segment does not resolve, including for an
    /// empty path.
    pub fn get_signer(&self, path: &[&str]) -> Option<&CertificateSigner> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.signers.get(*first)?, |signer, name| signer.get_sub_ca(name))
    }

    pub fn get_signer_mut(&mut self, path: &[&str]) -> Option<&mut CertificateSigner> {
        let (first, rest) = path.split_first()?;
        let mut signer = self.signers.get_mut(*first)?;
        for name in rest {
            signer = signer.get_sub_ca_mut(name)?;
        }
        Some(signer)
    }

    /// Certificate and key PEM of the leaf at `path`.
    ///
    /// The last segment names the leaf, everything before it the signer.
    pub fn get_cert_key(&self, path: &[&str]) -> Result<(Vec<u8>, Vec<u8>)> {
        let Some((leaf, signer_path)) = path.split_last().filter(|_| path.len() >= 2) else {
            return Err(ChainError::InvalidPath {
                path: owned_path(path),
            });
        };
        let signer = self
            .get_signer(signer_path)
            .ok_or_else(|| ChainError::SignerNotFound {
                path: owned_path(signer_path),
            })?;
        signer.get_cert_key(leaf)
    }

    /// Depth-first walk calling `visit` with the path and parsed certificate of
    /// every node.
    ///
    /// A signer is visited before its sub-CAs, which are fully walked in name
    /// order before the signer's own leaves. An empty `root_path` walks every
    /// top-level signer; a path ending in a leaf visits just that leaf.
    pub fn walk_chains<F>(&self, root_path: &[&str], mut visit: F) -> Result<()>
    where
        F: FnMut(&[String], &CertificateInfo) -> std::result::Result<(), VisitError>,
    {
        if root_path.is_empty() {
            for (name, signer) in &self.signers {
                walk_signer(&mut vec![name.clone()], signer, &mut visit)?;
            }
            return Ok(());
        }

        if let Some(signer) = self.get_signer(root_path) {
            return walk_signer(&mut owned_path(root_path), signer, &mut visit);
        }

        let (leaf, signer_path) = match root_path.split_last() {
            Some((leaf, signer_path)) if !signer_path.is_empty() => (leaf, signer_path),
            _ => {
                return Err(ChainError::NotASignerPath {
                    path: owned_path(root_path),
                })
            }
        };
        let signer = self
            .get_signer(signer_path)
            .ok_or_else(|| ChainError::IntermediateNotSigner {
                path: owned_path(root_path),
            })?;
        let info = signer
            .certificate_info(leaf)
            .ok_or_else(|| ChainError::CertificateNotFound {
                signer: signer.name().to_string(),
                name: (*leaf).to_string(),
            })?;

        let path = owned_path(root_path);
        visit(path.as_slice(), info).map_err(|source| ChainError::Visit { path, source })
    }

    /// Regenerate material at `path`; an empty path regenerates every chain.
    pub fn regenerate(&mut self, path: &[&str]) -> Result<()> {
        let Some((first, rest)) = path.split_first() else {
            for signer in self.signers.values_mut() {
                signer.regenerate(&[])?;
            }
            return Ok(());
        };
        self.signers
            .get_mut(*first)
            .ok_or_else(|| ChainError::SignerNotFound {
                path: owned_path(path),
            })?
            .regenerate(rest)
    }
}

fn walk_signer<F>(path: &mut Vec<String>, signer: &CertificateSigner, visit: &mut F) -> Result<()>
where
    F: FnMut(&[String], &CertificateInfo) -> std::result::Result<(), VisitError>,
{
    visit(path.as_slice(), signer.info()).map_err(|source| ChainError::Visit {
        path: path.clone(),
        source,
    })?;

    for (name, sub_ca) in signer.sub_cas() {
        path.push(name.to_string());
        walk_signer(path, sub_ca, visit)?;
        path.pop();
    }

    for (name, info) in signer.certificates() {
        path.push(name.to_string());
        visit(path.as_slice(), info).map_err(|source| ChainError::Visit {
            path: path.clone(),
            source,
        })?;
        path.pop();
    }
    Ok(())
}
