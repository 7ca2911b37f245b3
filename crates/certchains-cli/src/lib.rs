//! # certchains-cli
//!
//! Operator command-line interface over a certchains TOML layout.
//!
//! ## Commands
//!
//! - **ensure**: create whatever material is missing or invalid
//! - **walk**: print the certificate tree with expiry and rotation times
//! - **rotation**: report the certificate that needs rotating first
//! - **cert**: print certificate or key PEM for a leaf
//! - **regenerate**: force re-issuance of a subtree

pub mod cli;
pub mod config;
pub mod output;

pub use cli::run;
