//! # certchains
//!
//! Declarative builder and query layer for a hierarchical cluster PKI.
//!
//! ## Architecture
//!
//! ```text
//! CertificateChains
//!   ├── signer "etcd-signer"            (self-signed, ca.crt / ca.key / serial.txt)
//!   │     ├── sub-CA "etcd-nested"      (ca.crt + ca-bundle.crt, signed by etcd-signer)
//!   │     ├── client "apiserver-etcd"   (<dir>/apiserver-etcd/client.crt, client.key)
//!   │     └── peer   "etcd-peer"        (<dir>/etcd-peer/peer.crt, peer.key)
//!   └── signer "kube-apiserver-signer"
//!         └── serving "kube-apiserver"  (<dir>/kube-apiserver/server.crt, server.key)
//! ```
//!
//! Specifications ([`SignerSpec`], [`CertificateChainsBuilder`]) are plain
//! values; nothing touches the filesystem until `complete()`. Completion reuses
//! every piece of valid material already on disk, so running it on each start
//! only creates what is missing, expired, or no longer matches its declaration.
//!
//! ## Example
//!
//! ```rust,no_run
//! use certchains::{
//!     when_to_rotate_at_earliest, CertificateChainsBuilder, ClientCertificateRequest,
//!     ServingCertificateRequest, SignerSpec, UserInfo,
//! };
//! use chrono::Duration;
//!
//! let chains = CertificateChainsBuilder::new()
//!     .with_signers([
//!         SignerSpec::new("s1", "/var/lib/pki/s1", Duration::days(3650)).with_client_certificates([
//!             ClientCertificateRequest::new(
//!                 "c1",
//!                 Duration::days(365),
//!                 UserInfo::new("alice").with_groups(["g1", "g2"]),
//!             ),
//!         ]),
//!         SignerSpec::new("s2", "/var/lib/pki/s2", Duration::days(3650)).with_serving_certificates([
//!             ServingCertificateRequest::new("srv1", Duration::days(365), ["h1", "h2"]),
//!         ]),
//!     ])
//!     .with_ca_bundle("/var/lib/pki/ca-bundle.crt", [["s1"], ["s2"]])
//!     .complete()?;
//!
//! let (cert_pem, key_pem) = chains.get_cert_key(&["s1", "c1"])?;
//! if let Some(deadline) = when_to_rotate_at_earliest(&chains)? {
//!     println!("rotate {} at {}", deadline.path.join("/"), deadline.rotate_at);
//! }
//! # Ok::<(), certchains::ChainError>(())
//! ```

mod builder;
mod bundle;
mod certinfo;
mod chains;
mod chains_builder;
mod error;
mod layout;
mod material;
pub mod paths;
mod request;
mod rotation;
mod signer;

pub use builder::SignerSpec;
pub use bundle::{merge_into_bundle, read_bundle, BundleChange};
pub use certinfo::{CertificateInfo, ROTATION_DENOMINATOR, ROTATION_NUMERATOR};
pub use chains::CertificateChains;
pub use chains_builder::CertificateChainsBuilder;
pub use error::{ChainError, MaterialError, Result, VisitError};
pub use layout::{BundleLayout, ChainsLayout, ClientLayout, PeerLayout, ServingLayout, SignerLayout};
pub use material::{ensure, Ensured, Materialize};
pub use request::{
    hostname_set, CertificateRequest, ClientCertificateRequest, CsrMeta, PeerCertificateRequest,
    ServingCertificateRequest, UserInfo,
};
pub use rotation::{when_to_rotate_at_earliest, RotationDeadline};
pub use signer::CertificateSigner;
