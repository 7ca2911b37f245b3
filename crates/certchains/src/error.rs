//! Error types for certificate chain construction and lookup.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for certificate chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Boxed error returned by walk visitors.
pub type VisitError = Box<dyn std::error::Error + Send + Sync>;

/// Failures of the signing primitive or of the files backing it.
#[derive(Error, Debug)]
pub enum MaterialError {
    /// Reading or writing a file failed.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// OpenSSL refused to generate, sign or parse something.
    #[error("openssl: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    /// A certificate could not be parsed for inspection.
    #[error("failed to parse certificate: {reason}")]
    CertParse { reason: String },

    /// A PEM file held no usable blocks.
    #[error("no PEM material in {path}: {reason}")]
    Pem { path: PathBuf, reason: String },

    /// A serial counter file is malformed.
    #[error("invalid serial file {path}: {reason}")]
    Serial { path: PathBuf, reason: String },

    /// The requested lifetime runs past any representable date.
    #[error("validity period does not fit in a certificate")]
    ValidityOutOfRange,

    /// The private key on disk does not belong to the certificate.
    #[error("private key does not match certificate")]
    KeyMismatch,

    /// The certificate on disk is outside its validity window.
    #[error("certificate has expired")]
    Expired,

    /// The certificate on disk was not signed by the expected issuer.
    #[error("certificate is not signed by the expected issuer")]
    UntrustedIssuer,

    /// The certificate on disk carries a different hostname set.
    #[error("certificate hostnames {found:?} differ from requested {wanted:?}")]
    HostnameMismatch {
        found: Vec<String>,
        wanted: Vec<String>,
    },
}

impl MaterialError {
    /// Build an IO error annotated with the file it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors returned by signers and certificate chains.
#[derive(Error, Debug)]
pub enum ChainError {
    /// A path segment did not resolve to a known signer.
    #[error("no such signer in the path: {}", path.join("/"))]
    SignerNotFound { path: Vec<String> },

    /// A signer has no leaf certificate with this name.
    #[error("no certificate with name {name:?} was found under signer {signer:?}")]
    CertificateNotFound { signer: String, name: String },

    /// Two siblings were declared with the same name.
    #[error("signer name clash: {name}")]
    NameClash { name: String },

    /// A certificate lookup path is too short to address a leaf.
    #[error("certificate path {:?} must name a signer and a certificate", path.join("/"))]
    InvalidPath { path: Vec<String> },

    /// A single-segment walk root does not name a top-level signer.
    #[error("{} is not a path to a signer", path.join("/"))]
    NotASignerPath { path: Vec<String> },

    /// A non-leaf fragment of a walk path is missing or is not a signer.
    #[error("a non-leaf fragment of the path {:?} either is not a signer or it doesn't exist", path.join("/"))]
    IntermediateNotSigner { path: Vec<String> },

    /// A signer or certificate was declared with a validity under one second.
    #[error("validity of {name:?} must be at least one second")]
    InvalidValidity { name: String },

    /// A signing request cannot be satisfied as declared.
    #[error("invalid signing request {name:?}: {reason}")]
    InvalidRequest { name: String, reason: String },

    /// Producing material for the named signer or certificate failed.
    #[error("failed to generate {name:?}: {source}")]
    Generation {
        name: String,
        #[source]
        source: MaterialError,
    },

    /// Merging a signer certificate into a CA bundle failed.
    #[error("failed adding the signer {signer:?} to CA bundle {}: {source}", bundle.display())]
    Bundle {
        bundle: PathBuf,
        signer: String,
        #[source]
        source: MaterialError,
    },

    /// A walk visitor returned an error.
    #[error("failed to execute walk function on {}: {source}", path.join("/"))]
    Visit {
        path: Vec<String>,
        #[source]
        source: VisitError,
    },

    /// A chain layout document is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem error outside material generation.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ChainError {
    /// Attach the name of the signer or certificate being produced.
    pub fn generation(name: impl Into<String>, source: MaterialError) -> Self {
        Self::Generation {
            name: name.into(),
            source,
        }
    }

    /// Build an IO error annotated with the file it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the error reports a signer that could not be resolved.
    #[must_use]
    pub const fn is_signer_not_found(&self) -> bool {
        matches!(self, Self::SignerNotFound { .. })
    }
}

pub(crate) fn owned_path(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_rendering() {
        let err = ChainError::SignerNotFound {
            path: owned_path(&["root", "intermediate"]),
        };
        assert_eq!(err.to_string(), "no such signer in the path: root/intermediate");
        assert!(err.is_signer_not_found());
    }

    #[test]
    fn test_generation_keeps_source() {
        let err = ChainError::generation("etcd-peer", MaterialError::KeyMismatch);
        assert!(err.to_string().contains("etcd-peer"));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("private key does not match certificate"));
    }
}
