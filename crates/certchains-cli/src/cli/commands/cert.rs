//! `certchains cert` - print PEM material of a leaf.

use std::io::Write;

use anyhow::Result;

use super::{segments, Context};
use crate::cli::args::CertArgs;
use crate::output::{print_json, OutputFormat};

pub fn execute(ctx: &Context, args: &CertArgs) -> Result<()> {
    let chains = ctx.complete()?;
    let (cert, key) = chains.get_cert_key(&segments(&args.path))?;
    let pem = if args.key { key } else { cert };

    match ctx.output_format {
        OutputFormat::Json => {
            let field = if args.key { "key" } else { "certificate" };
            let mut out = serde_json::Map::new();
            out.insert("path".to_string(), serde_json::json!(args.path));
            out.insert(field.to_string(), serde_json::json!(String::from_utf8_lossy(&pem)));
            print_json(&out)?;
        }
        OutputFormat::Pretty => std::io::stdout().write_all(&pem)?,
    }

    Ok(())
}
