//! On-disk layout of signer and leaf material.
//!
//! Every signer owns a directory holding its certificate, key and serial
//! counter. Each leaf lives in `<signer dir>/<leaf name>/` with a file pair
//! named after the leaf kind.

use std::path::{Path, PathBuf};

pub const CA_CERT_FILE_NAME: &str = "ca.crt";
pub const CA_KEY_FILE_NAME: &str = "ca.key";
pub const CA_BUNDLE_FILE_NAME: &str = "ca-bundle.crt";
pub const CA_SERIAL_FILE_NAME: &str = "serial.txt";
pub const SERVER_CERT_FILE_NAME: &str = "server.crt";
pub const SERVER_KEY_FILE_NAME: &str = "server.key";
pub const CLIENT_CERT_FILE_NAME: &str = "client.crt";
pub const CLIENT_KEY_FILE_NAME: &str = "client.key";
pub const PEER_CERT_FILE_NAME: &str = "peer.crt";
pub const PEER_KEY_FILE_NAME: &str = "peer.key";

pub fn ca_cert_path(dir: &Path) -> PathBuf {
    dir.join(CA_CERT_FILE_NAME)
}

pub fn ca_key_path(dir: &Path) -> PathBuf {
    dir.join(CA_KEY_FILE_NAME)
}

pub fn ca_serial_path(dir: &Path) -> PathBuf {
    dir.join(CA_SERIAL_FILE_NAME)
}

/// Sub-CA certificate followed by the certificates of its parents.
pub fn ca_bundle_path(dir: &Path) -> PathBuf {
    dir.join(CA_BUNDLE_FILE_NAME)
}

pub fn client_cert_path(dir: &Path) -> PathBuf {
    dir.join(CLIENT_CERT_FILE_NAME)
}

pub fn client_key_path(dir: &Path) -> PathBuf {
    dir.join(CLIENT_KEY_FILE_NAME)
}

pub fn serving_cert_path(dir: &Path) -> PathBuf {
    dir.join(SERVER_CERT_FILE_NAME)
}

pub fn serving_key_path(dir: &Path) -> PathBuf {
    dir.join(SERVER_KEY_FILE_NAME)
}

pub fn peer_cert_path(dir: &Path) -> PathBuf {
    dir.join(PEER_CERT_FILE_NAME)
}

pub fn peer_key_path(dir: &Path) -> PathBuf {
    dir.join(PEER_KEY_FILE_NAME)
}
