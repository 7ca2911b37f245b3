//! Certificate and key material, and the idempotent `ensure` primitive.
//!
//! Every piece of on-disk material (root CA, sub-CA, leaf) is produced through
//! [`ensure`]: reuse what is on disk when it passes validation, otherwise
//! generate, persist and return fresh material.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509NameBuilder, X509Ref, X509};
use tracing::{debug, info};

use crate::certinfo::CertificateInfo;
use crate::error::MaterialError;
use crate::paths;
use crate::request::UserInfo;

const RSA_KEY_BITS: u32 = 2048;
pub(crate) const CERT_FILE_MODE: u32 = 0o644;
pub(crate) const KEY_FILE_MODE: u32 = 0o600;

/// Outcome of [`ensure`].
#[derive(Debug)]
pub struct Ensured<T> {
    pub material: T,
    /// False when the material was loaded from disk
    pub created: bool,
}

/// Something that can be loaded from disk or generated and persisted.
pub trait Materialize {
    type Material;

    /// Path used in log events.
    fn location(&self) -> &Path;

    /// Read existing material, failing if it is absent or unusable.
    fn load(&self) -> Result<Self::Material, MaterialError>;

    /// Create new material and write it to disk.
    fn generate(&self) -> Result<Self::Material, MaterialError>;
}

/// Reuse valid on-disk material or create it.
pub fn ensure<M: Materialize>(request: &M) -> Result<Ensured<M::Material>, MaterialError> {
    match request.load() {
        Ok(material) => {
            debug!(path = %request.location().display(), "reusing existing material");
            Ok(Ensured {
                material,
                created: false,
            })
        }
        Err(e) => {
            debug!(path = %request.location().display(), reason = %e, "existing material unusable");
            let material = request.generate()?;
            info!(path = %request.location().display(), "generated new material");
            Ok(Ensured {
                material,
                created: true,
            })
        }
    }
}

// ============================================================================
// Serial counter
// ============================================================================

/// Hex counter of the last serial number a CA issued.
#[derive(Debug, Clone)]
pub struct SerialFile {
    path: PathBuf,
}

impl SerialFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MaterialError> {
        let serial = Self { path: path.into() };
        serial.read()?;
        Ok(serial)
    }

    fn create(path: impl Into<PathBuf>) -> Result<Self, MaterialError> {
        let serial = Self { path: path.into() };
        write_file(&serial.path, b"00\n", KEY_FILE_MODE)?;
        Ok(serial)
    }

    fn read(&self) -> Result<u64, MaterialError> {
        let content = fs::read_to_string(&self.path).map_err(|e| MaterialError::io(&self.path, e))?;
        u64::from_str_radix(content.trim(), 16).map_err(|e| MaterialError::Serial {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Allocate the next serial number and persist it.
    pub fn next(&self) -> Result<Asn1Integer, MaterialError> {
        let next = self.read()?.checked_add(1).ok_or_else(|| MaterialError::Serial {
            path: self.path.clone(),
            reason: "serial counter exhausted".to_string(),
        })?;
        write_file(&self.path, format!("{next:02X}\n").as_bytes(), KEY_FILE_MODE)?;
        Ok(BigNum::from_hex_str(&format!("{next:X}"))?.to_asn1_integer()?)
    }
}

// ============================================================================
// Materials
// ============================================================================

/// Key material of a certificate authority.
#[derive(Debug)]
pub struct CaMaterial {
    /// Own certificate first, then the parents' up to the root
    certs: Vec<X509>,
    key: PKey<Private>,
    serial: SerialFile,
    info: CertificateInfo,
}

impl CaMaterial {
    fn new(certs: Vec<X509>, key: PKey<Private>, serial: SerialFile) -> Result<Self, MaterialError> {
        let info = match certs.first() {
            Some(cert) => CertificateInfo::from_der(&cert.to_der()?)?,
            None => {
                return Err(MaterialError::CertParse {
                    reason: "empty certificate chain".to_string(),
                })
            }
        };
        Ok(Self {
            certs,
            key,
            serial,
            info,
        })
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certs[0]
    }

    pub const fn info(&self) -> &CertificateInfo {
        &self.info
    }

    /// True for a self-signed CA.
    pub fn is_root(&self) -> bool {
        self.certs.len() == 1
    }

    /// PEM of this CA's certificate alone.
    pub fn cert_pem(&self) -> Result<Vec<u8>, MaterialError> {
        Ok(self.certificate().to_pem()?)
    }

    /// PEM of this CA's certificate followed by its parents.
    pub fn chain_pem(&self) -> Result<Vec<u8>, MaterialError> {
        encode_certs(&self.certs)
    }

    pub fn key_pem(&self) -> Result<Vec<u8>, MaterialError> {
        Ok(self.key.private_key_to_pem_pkcs8()?)
    }

    /// Whether `cert` carries a valid signature from this CA's key.
    fn issued(&self, cert: &X509Ref) -> Result<bool, MaterialError> {
        Ok(cert.verify(&self.key)?)
    }
}

/// Certificate chain and key of an issued leaf.
#[derive(Debug)]
pub struct LeafMaterial {
    /// Leaf first, then the issuer chain
    certs: Vec<X509>,
    key: PKey<Private>,
    info: CertificateInfo,
}

impl LeafMaterial {
    fn new(certs: Vec<X509>, key: PKey<Private>) -> Result<Self, MaterialError> {
        let info = match certs.first() {
            Some(cert) => CertificateInfo::from_der(&cert.to_der()?)?,
            None => {
                return Err(MaterialError::CertParse {
                    reason: "empty certificate chain".to_string(),
                })
            }
        };
        Ok(Self { certs, key, info })
    }

    pub const fn info(&self) -> &CertificateInfo {
        &self.info
    }

    pub fn cert_pem(&self) -> Result<Vec<u8>, MaterialError> {
        encode_certs(&self.certs)
    }

    pub fn key_pem(&self) -> Result<Vec<u8>, MaterialError> {
        Ok(self.key.private_key_to_pem_pkcs8()?)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Self-signed CA stored in `dir`.
pub struct RootCaRequest<'a> {
    pub dir: &'a Path,
    pub name: &'a str,
    pub validity: Duration,
}

impl Materialize for RootCaRequest<'_> {
    type Material = CaMaterial;

    fn location(&self) -> &Path {
        self.dir
    }

    fn load(&self) -> Result<CaMaterial, MaterialError> {
        let certs = read_certs(&paths::ca_cert_path(self.dir))?;
        let key = read_key(&paths::ca_key_path(self.dir))?;
        let serial = SerialFile::open(paths::ca_serial_path(self.dir))?;
        let material = CaMaterial::new(certs, key, serial)?;
        check_key(material.certificate(), &material.key)?;
        check_not_expired(&material.info)?;
        Ok(material)
    }

    fn generate(&self) -> Result<CaMaterial, MaterialError> {
        let key = generate_key()?;
        let name = subject_name(self.name, &[])?;
        let serial = random_serial()?;
        let cert = CertTemplate::ca(name, self.validity).sign(&key, None, &serial)?;

        write_file(&paths::ca_cert_path(self.dir), &cert.to_pem()?, CERT_FILE_MODE)?;
        write_file(
            &paths::ca_key_path(self.dir),
            &key.private_key_to_pem_pkcs8()?,
            KEY_FILE_MODE,
        )?;
        let serial = SerialFile::create(paths::ca_serial_path(self.dir))?;
        CaMaterial::new(vec![cert], key, serial)
    }
}

/// CA stored in `dir` and signed by `parent`.
pub struct SubCaRequest<'a> {
    pub parent: &'a CaMaterial,
    pub dir: &'a Path,
    pub name: &'a str,
    pub validity: Duration,
}

impl SubCaRequest<'_> {
    /// Write the single-certificate file consumers expect next to the bundle.
    pub fn write_cert_file(&self, material: &CaMaterial) -> Result<(), MaterialError> {
        write_file(&paths::ca_cert_path(self.dir), &material.cert_pem()?, CERT_FILE_MODE)
    }
}

impl Materialize for SubCaRequest<'_> {
    type Material = CaMaterial;

    fn location(&self) -> &Path {
        self.dir
    }

    fn load(&self) -> Result<CaMaterial, MaterialError> {
        let certs = read_certs(&paths::ca_bundle_path(self.dir))?;
        let key = read_key(&paths::ca_key_path(self.dir))?;
        let serial = SerialFile::open(paths::ca_serial_path(self.dir))?;
        let material = CaMaterial::new(certs, key, serial)?;
        check_key(material.certificate(), &material.key)?;
        check_not_expired(&material.info)?;
        if !self.parent.issued(material.certificate())? {
            return Err(MaterialError::UntrustedIssuer);
        }
        Ok(material)
    }

    fn generate(&self) -> Result<CaMaterial, MaterialError> {
        let key = generate_key()?;
        let name = subject_name(self.name, &[])?;
        let serial = self.parent.serial.next()?;
        let cert = CertTemplate::ca(name, self.validity).sign(&key, Some(self.parent), &serial)?;

        let mut certs = vec![cert];
        certs.extend(self.parent.certs.iter().cloned());

        write_file(&paths::ca_bundle_path(self.dir), &encode_certs(&certs)?, CERT_FILE_MODE)?;
        write_file(
            &paths::ca_key_path(self.dir),
            &key.private_key_to_pem_pkcs8()?,
            KEY_FILE_MODE,
        )?;
        let serial = SerialFile::create(paths::ca_serial_path(self.dir))?;
        CaMaterial::new(certs, key, serial)
    }
}

/// What a leaf certificate is for.
#[derive(Debug, Clone)]
pub enum LeafProfile<'a> {
    Client { user: &'a UserInfo },
    Serving { hostnames: &'a BTreeSet<String> },
    Peer {
        user: &'a UserInfo,
        hostnames: &'a BTreeSet<String>,
    },
}

impl LeafProfile<'_> {
    const fn hostnames(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Client { .. } => None,
            Self::Serving { hostnames } | Self::Peer { hostnames, .. } => Some(hostnames),
        }
    }
}

/// Leaf certificate issued by `issuer` into a cert/key file pair.
pub struct LeafRequest<'a> {
    pub issuer: &'a CaMaterial,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub validity: Duration,
    pub profile: LeafProfile<'a>,
}

impl Materialize for LeafRequest<'_> {
    type Material = LeafMaterial;

    fn location(&self) -> &Path {
        &self.cert_path
    }

    fn load(&self) -> Result<LeafMaterial, MaterialError> {
        let certs = read_certs(&self.cert_path)?;
        let key = read_key(&self.key_path)?;
        let material = LeafMaterial::new(certs, key)?;

        if let Some(wanted) = self.profile.hostnames() {
            let found = material.info.hostnames();
            if &found != wanted {
                return Err(MaterialError::HostnameMismatch {
                    found: found.into_iter().collect(),
                    wanted: wanted.iter().cloned().collect(),
                });
            }
        }
        // peers only need to exist with the right hostnames
        if matches!(self.profile, LeafProfile::Peer { .. }) {
            return Ok(material);
        }

        check_key(&material.certs[0], &material.key)?;
        check_not_expired(&material.info)?;
        if !self.issuer.issued(&material.certs[0])? {
            return Err(MaterialError::UntrustedIssuer);
        }
        Ok(material)
    }

    fn generate(&self) -> Result<LeafMaterial, MaterialError> {
        let key = generate_key()?;
        let template = match &self.profile {
            LeafProfile::Client { user } => {
                let name = subject_name(&user.name, &user.subject_groups())?;
                CertTemplate::leaf(name, self.validity, ExtendedUsage::Client, Vec::new())
            }
            LeafProfile::Serving { hostnames } => {
                let common_name = hostnames.iter().next().map_or("", String::as_str);
                let name = subject_name(common_name, &[])?;
                let sans = hostnames.iter().cloned().collect();
                CertTemplate::leaf(name, self.validity, ExtendedUsage::Server, sans)
            }
            LeafProfile::Peer { user, hostnames } => {
                let name = subject_name(&user.name, &user.subject_groups())?;
                let sans = hostnames.iter().cloned().collect();
                CertTemplate::leaf(name, self.validity, ExtendedUsage::Both, sans)
            }
        };
        let serial = self.issuer.serial.next()?;
        let cert = template.sign(&key, Some(self.issuer), &serial)?;

        let mut certs = vec![cert];
        certs.extend(self.issuer.certs.iter().cloned());

        write_file(&self.cert_path, &encode_certs(&certs)?, CERT_FILE_MODE)?;
        write_file(&self.key_path, &key.private_key_to_pem_pkcs8()?, KEY_FILE_MODE)?;
        LeafMaterial::new(certs, key)
    }
}

// ============================================================================
// Certificate construction
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum ExtendedUsage {
    Client,
    Server,
    Both,
}

/// Everything that varies between the certificate profiles.
struct CertTemplate {
    subject: X509Name,
    validity: Duration,
    is_ca: bool,
    usage: Option<ExtendedUsage>,
    hostnames: Vec<String>,
}

impl CertTemplate {
    fn ca(subject: X509Name, validity: Duration) -> Self {
        Self {
            subject,
            validity,
            is_ca: true,
            usage: None,
            hostnames: Vec::new(),
        }
    }

    fn leaf(subject: X509Name, validity: Duration, usage: ExtendedUsage, hostnames: Vec<String>) -> Self {
        Self {
            subject,
            validity,
            is_ca: false,
            usage: Some(usage),
            hostnames,
        }
    }

    /// Build and sign; self-signed when `issuer` is `None`.
    fn sign(
        &self,
        key: &PKey<Private>,
        issuer: Option<&CaMaterial>,
        serial: &Asn1Integer,
    ) -> Result<X509, MaterialError> {
        let not_before = now_seconds();
        let not_after = not_before
            .checked_add_signed(self.validity)
            .ok_or(MaterialError::ValidityOutOfRange)?;

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_serial_number(serial)?;
        builder.set_subject_name(&self.subject)?;
        match issuer {
            Some(ca) => builder.set_issuer_name(ca.certificate().subject_name())?,
            None => builder.set_issuer_name(&self.subject)?,
        }
        let not_before_asn1: Asn1Time = Asn1Time::from_unix(not_before.timestamp())?;
        let not_after_asn1: Asn1Time = Asn1Time::from_unix(not_after.timestamp())?;
        builder.set_not_before(&not_before_asn1)?;
        builder.set_not_after(&not_after_asn1)?;
        builder.set_pubkey(key)?;

        let mut constraints = BasicConstraints::new();
        constraints.critical();
        if self.is_ca {
            constraints.ca();
        }
        builder.append_extension(constraints.build()?)?;

        let mut usage = KeyUsage::new();
        usage.critical().digital_signature().key_encipherment();
        if self.is_ca {
            usage.key_cert_sign();
        }
        builder.append_extension(usage.build()?)?;

        if let Some(extended) = self.usage {
            let mut eku = ExtendedKeyUsage::new();
            match extended {
                ExtendedUsage::Client => eku.client_auth(),
                ExtendedUsage::Server => eku.server_auth(),
                ExtendedUsage::Both => eku.client_auth().server_auth(),
            };
            builder.append_extension(eku.build()?)?;
        }

        let issuer_cert = issuer.map(CaMaterial::certificate);
        let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(issuer_cert, None))?;
        builder.append_extension(ski)?;
        if issuer_cert.is_some() {
            let aki = AuthorityKeyIdentifier::new()
                .keyid(false)
                .build(&builder.x509v3_context(issuer_cert, None))?;
            builder.append_extension(aki)?;
        }

        if !self.hostnames.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for host in &self.hostnames {
                if host.parse::<std::net::IpAddr>().is_ok() {
                    san.ip(host);
                } else {
                    san.dns(host);
                }
            }
            let san = san.build(&builder.x509v3_context(issuer_cert, None))?;
            builder.append_extension(san)?;
        }

        let signing_key = issuer.map_or(key, |ca| &ca.key);
        builder.sign(signing_key, MessageDigest::sha256())?;
        Ok(builder.build())
    }
}

fn subject_name(common_name: &str, organizations: &[String]) -> Result<X509Name, MaterialError> {
    let mut name = X509NameBuilder::new()?;
    if !common_name.is_empty() {
        name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    }
    for org in organizations {
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, org)?;
    }
    Ok(name.build())
}

fn generate_key() -> Result<PKey<Private>, MaterialError> {
    Ok(PKey::from_rsa(Rsa::generate(RSA_KEY_BITS)?)?)
}

fn random_serial() -> Result<Asn1Integer, MaterialError> {
    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    Ok(serial.to_asn1_integer()?)
}

/// Current time truncated to the precision X.509 can carry.
fn now_seconds() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_else(Utc::now)
}

// ============================================================================
// Files
// ============================================================================

fn check_key(cert: &X509Ref, key: &PKey<Private>) -> Result<(), MaterialError> {
    if cert.public_key()?.public_eq(key) {
        Ok(())
    } else {
        Err(MaterialError::KeyMismatch)
    }
}

fn check_not_expired(info: &CertificateInfo) -> Result<(), MaterialError> {
    if info.is_valid_at(Utc::now()) {
        Ok(())
    } else {
        Err(MaterialError::Expired)
    }
}

pub(crate) fn read_certs(path: &Path) -> Result<Vec<X509>, MaterialError> {
    let content = fs::read(path).map_err(|e| MaterialError::io(path, e))?;
    let certs = X509::stack_from_pem(&content)?;
    if certs.is_empty() {
        return Err(MaterialError::Pem {
            path: path.to_path_buf(),
            reason: "no certificates".to_string(),
        });
    }
    Ok(certs)
}

fn read_key(path: &Path) -> Result<PKey<Private>, MaterialError> {
    let content = fs::read(path).map_err(|e| MaterialError::io(path, e))?;
    Ok(PKey::private_key_from_pem(&content)?)
}

pub(crate) fn encode_certs(certs: &[X509]) -> Result<Vec<u8>, MaterialError> {
    let mut out = Vec::new();
    for cert in certs {
        out.extend_from_slice(&cert.to_pem()?);
    }
    Ok(out)
}

/// Write `content`, creating parent directories first.
pub(crate) fn write_file(path: &Path, content: &[u8], mode: u32) -> Result<(), MaterialError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| MaterialError::io(parent, e))?;
    }
    fs::write(path, content).map_err(|e| MaterialError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| MaterialError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}
