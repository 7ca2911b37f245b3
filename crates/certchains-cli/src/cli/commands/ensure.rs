//! `certchains ensure` - materialize the layout and list its signers.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::output::{print_json, OutputFormat};

pub fn execute(ctx: &Context) -> Result<()> {
    let chains = ctx.complete()?;
    let names = chains.signer_names();

    match ctx.output_format {
        OutputFormat::Json => print_json(&names)?,
        OutputFormat::Pretty => {
            println!("{}", "Signers ready:".bold());
            for name in &names {
                let path = [name.as_str()];
                match chains.get_signer(&path) {
                    Some(signer) if ctx.verbose => {
                        println!("  {} {}", name.green(), signer.dir().display().to_string().dimmed());
                    }
                    _ => println!("  {}", name.green()),
                }
            }
        }
    }

    Ok(())
}
