//! Command implementations.

pub mod cert;
pub mod ensure;
pub mod regenerate;
pub mod rotation;
pub mod walk;

use std::path::{Path, PathBuf};

use certchains::{CertificateChains, ChainsLayout};
use tracing::debug;

use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Chain layout file
    pub layout: Option<PathBuf>,

    /// Output format
    pub output_format: OutputFormat,

    /// Verbose output
    pub verbose: bool,
}

impl Context {
    /// Get the layout path, returning an error if not set.
    pub fn require_layout(&self) -> anyhow::Result<&Path> {
        self.layout.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "Layout file required.\n\n\
                 Set it with one of:\n  \
                 1. --layout <PATH>\n  \
                 2. CERTCHAINS_LAYOUT environment variable\n  \
                 3. layout = \"<PATH>\" in the certchains config.toml"
            )
        })
    }

    /// Load the layout and complete it. Relative paths in the layout are
    /// resolved against the layout file's directory.
    pub fn complete(&self) -> anyhow::Result<CertificateChains> {
        let path = self.require_layout()?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        debug!(layout = %path.display(), base_dir = %base_dir.display(), "loading layout");

        let chains = ChainsLayout::load(path)?.into_builder(base_dir)?.complete()?;
        Ok(chains)
    }
}

/// Borrow owned path segments the way the library takes them.
pub fn segments(path: &[String]) -> Vec<&str> {
    path.iter().map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_layout_explains_sources() {
        let ctx = Context {
            layout: None,
            output_format: OutputFormat::Pretty,
            verbose: false,
        };
        let err = ctx.complete().unwrap_err();
        assert!(err.to_string().contains("CERTCHAINS_LAYOUT"));
    }

    #[test]
    fn test_complete_relative_to_layout() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = tmp.path().join("chains.toml");
        std::fs::write(
            &layout,
            "[[signers]]\nname = \"s1\"\ndir = \"s1\"\nvalidity_days = 10\n",
        )
        .unwrap();

        let ctx = Context {
            layout: Some(layout),
            output_format: OutputFormat::Json,
            verbose: false,
        };
        let chains = ctx.complete().unwrap();
        assert_eq!(chains.signer_names(), vec!["s1"]);
        assert!(tmp.path().join("s1").join("ca.crt").exists());
    }
}
