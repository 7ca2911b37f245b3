//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load()?;

    // Layout from CLI or env (clap handles both), then config
    let layout = cli.layout.or_else(|| config.layout.clone());
    let output_format = cli.output.or(config.output_format).unwrap_or_default();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let ctx = commands::Context {
        layout,
        output_format,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Ensure => commands::ensure::execute(&ctx),
        Commands::Walk(args) => commands::walk::execute(&ctx, &args),
        Commands::Rotation => commands::rotation::execute(&ctx),
        Commands::Cert(args) => commands::cert::execute(&ctx, &args),
        Commands::Regenerate(args) => commands::regenerate::execute(&ctx, &args),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("certchains=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("certchains=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
