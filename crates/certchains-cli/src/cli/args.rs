//! Command-line argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

/// Keep a hierarchical cluster PKI materialized on disk.
///
/// Every command first completes the layout, reusing valid material and
/// creating whatever is missing.
#[derive(Parser, Debug)]
#[command(name = "certchains")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Chain layout file (or set CERTCHAINS_LAYOUT)
    #[arg(short, long, env = "CERTCHAINS_LAYOUT", global = true)]
    pub layout: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Log material reuse and generation decisions
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create missing or invalid material and list the signers
    Ensure,

    /// Print certificates depth-first with expiry and rotation times
    Walk(WalkArgs),

    /// Show the certificate that needs rotating first
    Rotation,

    /// Print the certificate (or key) PEM of a leaf
    Cert(CertArgs),

    /// Throw away and re-issue material
    Regenerate(RegenerateArgs),
}

#[derive(Args, Debug)]
pub struct WalkArgs {
    /// Path to start from, e.g. `etcd-signer etcd-peer` (whole forest when empty)
    pub path: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CertArgs {
    /// Signer path followed by the certificate name
    #[arg(required = true, num_args = 2..)]
    pub path: Vec<String>,

    /// Print the private key instead of the certificate
    #[arg(long)]
    pub key: bool,
}

#[derive(Args, Debug)]
pub struct RegenerateArgs {
    /// Signer or certificate path (every chain when empty)
    pub path: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_walk_path() {
        let cli = Cli::try_parse_from(["certchains", "walk", "etcd-signer", "etcd-peer"]).unwrap();
        match cli.command {
            Commands::Walk(args) => assert_eq!(args.path, vec!["etcd-signer", "etcd-peer"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_command() {
        let cli = Cli::try_parse_from(["certchains", "rotation", "--output", "json", "-l", "chains.toml"]).unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
        assert_eq!(cli.layout, Some(PathBuf::from("chains.toml")));
    }

    #[test]
    fn test_cert_needs_signer_and_name() {
        assert!(Cli::try_parse_from(["certchains", "cert", "only-signer"]).is_err());

        let cli = Cli::try_parse_from(["certchains", "cert", "s1", "c1", "--key"]).unwrap();
        match cli.command {
            Commands::Cert(args) => {
                assert_eq!(args.path, vec!["s1", "c1"]);
                assert!(args.key);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
