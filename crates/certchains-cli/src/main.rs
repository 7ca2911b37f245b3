//! certchains - keep a cluster PKI layout materialized on disk.

use anyhow::Result;

fn main() -> Result<()> {
    certchains_cli::run()
}
