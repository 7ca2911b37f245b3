//! `certchains walk` - print the certificate tree.

use anyhow::Result;
use certchains::CertificateInfo;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use super::{segments, Context};
use crate::cli::args::WalkArgs;
use crate::output::{print_json, OutputFormat};

#[derive(Debug, Serialize)]
struct WalkEntry {
    path: Vec<String>,
    rotate_at: DateTime<Utc>,
    certificate: CertificateInfo,
}

pub fn execute(ctx: &Context, args: &WalkArgs) -> Result<()> {
    let chains = ctx.complete()?;

    let mut entries = Vec::new();
    chains.walk_chains(&segments(&args.path), |path, info| {
        entries.push(WalkEntry {
            path: path.to_vec(),
            rotate_at: info.rotate_at(),
            certificate: info.clone(),
        });
        Ok(())
    })?;

    match ctx.output_format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Pretty => {
            let now = Utc::now();
            for entry in &entries {
                print_entry(entry, now);
            }
        }
    }

    Ok(())
}

fn print_entry(entry: &WalkEntry, now: DateTime<Utc>) {
    let depth = entry.path.len().saturating_sub(1);
    let name = entry.path.last().map_or("", String::as_str);
    let info = &entry.certificate;

    let label = if info.is_ca { name.bold() } else { name.normal() };
    let rotate_at = entry.rotate_at.format("%Y-%m-%d %H:%M:%S").to_string();
    let rotate_at = if entry.rotate_at <= now {
        rotate_at.red()
    } else {
        rotate_at.normal()
    };

    println!("{}{} {}", "  ".repeat(depth), label, info.subject.dimmed());
    println!(
        "{}  expires {}  rotate at {}",
        "  ".repeat(depth),
        info.not_after.format("%Y-%m-%d %H:%M:%S"),
        rotate_at
    );
}
