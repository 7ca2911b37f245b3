//! Leaf certificate signing requests.
//!
//! A request only describes what should exist; nothing is generated until the
//! owning signer completes.

use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};

/// Identity bound into client and peer certificate subjects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Becomes the subject common name
    pub name: String,
    /// Become the subject organizations
    #[serde(default)]
    pub groups: Vec<String>,
}

impl UserInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Groups in the order they are written into the subject.
    ///
    /// Shorter names come first and equal lengths fall back to byte order.
    /// Some TLS stacks re-sort multi-valued organization entries by their DER
    /// encoding, whose first differing octet is the length, and reject
    /// subjects that are not already in that order.
    pub fn subject_groups(&self) -> Vec<String> {
        let mut groups = self.groups.clone();
        groups.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        groups
    }
}

/// Name and lifetime shared by every request kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrMeta {
    /// Unique within the issuing signer; also the leaf directory name
    pub name: String,
    pub validity: Duration,
}

impl CsrMeta {
    pub fn new(name: impl Into<String>, validity: Duration) -> Self {
        Self {
            name: name.into(),
            validity,
        }
    }
}

/// Request for a client authentication certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificateRequest {
    pub meta: CsrMeta,
    pub user: UserInfo,
}

impl ClientCertificateRequest {
    pub fn new(name: impl Into<String>, validity: Duration, user: UserInfo) -> Self {
        Self {
            meta: CsrMeta::new(name, validity),
            user,
        }
    }
}

/// Request for a serving certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingCertificateRequest {
    pub meta: CsrMeta,
    /// DNS names and IP literals
    pub hostnames: Vec<String>,
}

impl ServingCertificateRequest {
    pub fn new<I, S>(name: impl Into<String>, validity: Duration, hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            meta: CsrMeta::new(name, validity),
            hostnames: hostnames.into_iter().map(Into::into).collect(),
        }
    }
}

/// Request for a dual-purpose client and server certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificateRequest {
    pub meta: CsrMeta,
    pub user: UserInfo,
    pub hostnames: Vec<String>,
}

impl PeerCertificateRequest {
    pub fn new<I, S>(name: impl Into<String>, validity: Duration, user: UserInfo, hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            meta: CsrMeta::new(name, validity),
            user,
            hostnames: hostnames.into_iter().map(Into::into).collect(),
        }
    }
}

/// Any of the three leaf request kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateRequest {
    Client(ClientCertificateRequest),
    Serving(ServingCertificateRequest),
    Peer(PeerCertificateRequest),
}

impl CertificateRequest {
    pub const fn meta(&self) -> &CsrMeta {
        match self {
            Self::Client(r) => &r.meta,
            Self::Serving(r) => &r.meta,
            Self::Peer(r) => &r.meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    /// Reject requests that cannot produce a usable certificate.
    pub(crate) fn validate(&self) -> Result<()> {
        let meta = self.meta();
        if !is_usable_validity(meta.validity) {
            return Err(ChainError::InvalidValidity {
                name: meta.name.clone(),
            });
        }
        match self {
            Self::Client(r) if r.user.name.is_empty() => Err(ChainError::InvalidRequest {
                name: meta.name.clone(),
                reason: "client identity has no name".to_string(),
            }),
            Self::Serving(r) if r.hostnames.is_empty() => Err(ChainError::InvalidRequest {
                name: meta.name.clone(),
                reason: "serving certificate needs at least one hostname".to_string(),
            }),
            Self::Peer(r) if r.hostnames.is_empty() => Err(ChainError::InvalidRequest {
                name: meta.name.clone(),
                reason: "peer certificate needs at least one hostname".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl From<ClientCertificateRequest> for CertificateRequest {
    fn from(r: ClientCertificateRequest) -> Self {
        Self::Client(r)
    }
}

impl From<ServingCertificateRequest> for CertificateRequest {
    fn from(r: ServingCertificateRequest) -> Self {
        Self::Serving(r)
    }
}

impl From<PeerCertificateRequest> for CertificateRequest {
    fn from(r: PeerCertificateRequest) -> Self {
        Self::Peer(r)
    }
}

/// X.509 times have whole-second precision, so anything shorter collapses
/// the window to a single instant.
pub(crate) fn is_usable_validity(validity: Duration) -> bool {
    validity >= Duration::seconds(1)
}

/// Canonical hostname set: duplicates removed, IP literals normalised.
pub fn hostname_set<S: AsRef<str>>(hostnames: &[S]) -> BTreeSet<String> {
    hostnames
        .iter()
        .map(|h| {
            let h = h.as_ref();
            h.parse::<IpAddr>().map_or_else(|_| h.to_string(), |ip| ip.to_string())
        })
        .collect()
}
