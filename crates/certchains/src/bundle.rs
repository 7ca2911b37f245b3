//! CA bundle files.
//!
//! A bundle is a PEM concatenation of trust anchors. Contributions are merged
//! into whatever the file already holds so several signers, chains or runs can
//! share one bundle path.

use std::path::Path;

use openssl::x509::{X509Ref, X509};
use tracing::debug;

use crate::error::MaterialError;
use crate::material::{encode_certs, read_certs, write_file, CERT_FILE_MODE};

/// What [`merge_into_bundle`] did to the bundle file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleChange {
    /// The exact certificate was already present
    Unchanged,
    /// A certificate with the same subject and issuer was swapped out
    Replaced,
    /// The certificate was added at the end
    Appended,
}

/// Merge `cert` into the bundle at `bundle_path`.
///
/// An entry with the same subject and issuer is replaced when its encoding
/// differs; otherwise the certificate is appended. A missing bundle file is
/// created along with its parent directories.
pub fn merge_into_bundle(bundle_path: &Path, cert: &X509Ref) -> Result<BundleChange, MaterialError> {
    let mut certs = if bundle_path.exists() {
        match read_certs(bundle_path) {
            Ok(certs) => certs,
            Err(MaterialError::Pem { .. }) => Vec::new(),
            Err(e) => return Err(e),
        }
    } else {
        Vec::new()
    };

    let der = cert.to_der()?;
    let subject = cert.subject_name().to_der()?;
    let issuer = cert.issuer_name().to_der()?;

    let mut change = BundleChange::Appended;
    for existing in &mut certs {
        if existing.subject_name().to_der()? != subject || existing.issuer_name().to_der()? != issuer {
            continue;
        }
        if existing.to_der()? == der {
            change = BundleChange::Unchanged;
        } else {
            *existing = cert.to_owned();
            change = BundleChange::Replaced;
        }
        break;
    }

    match change {
        BundleChange::Unchanged => return Ok(change),
        BundleChange::Appended => certs.push(cert.to_owned()),
        BundleChange::Replaced => {}
    }

    write_file(bundle_path, &encode_certs(&certs)?, CERT_FILE_MODE)?;
    debug!(bundle = %bundle_path.display(), ?change, "updated CA bundle");
    Ok(change)
}

/// Every certificate currently in a bundle file.
pub fn read_bundle(bundle_path: &Path) -> Result<Vec<X509>, MaterialError> {
    read_certs(bundle_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{ensure, RootCaRequest};
    use chrono::Duration;
    use tempfile::TempDir;

    fn make_ca(dir: &Path, name: &str) -> X509 {
        let ca = ensure(&RootCaRequest {
            dir,
            name,
            validity: Duration::days(1),
        })
        .unwrap()
        .material;
        ca.certificate().to_owned()
    }

    #[test]
    fn test_merge_appends_then_ignores_duplicates() {
        let tmp = TempDir::new().unwrap();
        let bundle = tmp.path().join("bundles").join("ca-bundle.crt");
        let a = make_ca(&tmp.path().join("a"), "a");
        let b = make_ca(&tmp.path().join("b"), "b");

        assert_eq!(merge_into_bundle(&bundle, &a).unwrap(), BundleChange::Appended);
        assert_eq!(merge_into_bundle(&bundle, &b).unwrap(), BundleChange::Appended);
        assert_eq!(merge_into_bundle(&bundle, &a).unwrap(), BundleChange::Unchanged);

        assert_eq!(read_bundle(&bundle).unwrap().len(), 2);
    }

    #[test]
    fn test_merge_replaces_same_subject_in_place() {
        let tmp = TempDir::new().unwrap();
        let bundle = tmp.path().join("ca-bundle.crt");
        let first = make_ca(&tmp.path().join("one"), "same-name");
        let other = make_ca(&tmp.path().join("other"), "other");
        let second = make_ca(&tmp.path().join("two"), "same-name");

        merge_into_bundle(&bundle, &first).unwrap();
        merge_into_bundle(&bundle, &other).unwrap();
        assert_eq!(merge_into_bundle(&bundle, &second).unwrap(), BundleChange::Replaced);

        let certs = read_bundle(&bundle).unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0].to_der().unwrap(), second.to_der().unwrap());
        assert_eq!(certs[1].to_der().unwrap(), other.to_der().unwrap());
    }

    #[test]
    fn test_merge_keeps_foreign_certificates() {
        let tmp = TempDir::new().unwrap();
        let bundle = tmp.path().join("ca-bundle.crt");
        let foreign = make_ca(&tmp.path().join("foreign"), "foreign");
        std::fs::write(&bundle, foreign.to_pem().unwrap()).unwrap();

        let ours = make_ca(&tmp.path().join("ours"), "ours");
        merge_into_bundle(&bundle, &ours).unwrap();

        let certs = read_bundle(&bundle).unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0].to_der().unwrap(), foreign.to_der().unwrap());
    }
}
