//! `certchains regenerate` - force re-issuance of material.

use anyhow::Result;
use colored::Colorize;
use tracing::info;

use super::{segments, Context};
use crate::cli::args::RegenerateArgs;
use crate::output::{print_json, OutputFormat};

pub fn execute(ctx: &Context, args: &RegenerateArgs) -> Result<()> {
    let mut chains = ctx.complete()?;
    chains.regenerate(&segments(&args.path))?;

    let target = if args.path.is_empty() {
        "all chains".to_string()
    } else {
        args.path.join("/")
    };
    info!(path = %target, "regenerated");

    match ctx.output_format {
        OutputFormat::Json => print_json(&serde_json::json!({ "regenerated": args.path }))?,
        OutputFormat::Pretty => println!("{} {}", "Regenerated".green().bold(), target),
    }

    Ok(())
}
