//! `certchains rotation` - report the earliest rotation deadline.

use anyhow::Result;
use certchains::when_to_rotate_at_earliest;
use chrono::Utc;
use colored::Colorize;

use super::Context;
use crate::output::{print_json, OutputFormat};

pub fn execute(ctx: &Context) -> Result<()> {
    let chains = ctx.complete()?;
    let deadline = when_to_rotate_at_earliest(&chains)?;

    match ctx.output_format {
        OutputFormat::Json => print_json(&deadline)?,
        OutputFormat::Pretty => match deadline {
            None => println!("{}", "No certificates in layout".dimmed()),
            Some(deadline) => {
                let when = deadline.rotate_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();
                let when = if deadline.rotate_at <= Utc::now() {
                    when.red().bold()
                } else {
                    when.cyan().bold()
                };
                println!("{} {}", "Earliest rotation:".bold(), deadline.path.join("/"));
                println!("  {when}");
            }
        },
    }

    Ok(())
}
