mod cli;
mod commands;
mod config;
mod error;
mod script;

use std::process;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands},
    commands::CommandExecutor,
    config::AppConfig,
    error::Result,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if let Commands::Config { show, reset } = &args.command {
        if *reset {
            let path = AppConfig::reset(args.config.as_deref())?;
            println!("Configuration reset to defaults at {}", path.display());
        } else if *show {
            let config = AppConfig::load(args.config.as_deref())?;
            println!("{}", config.show()?);
        } else {
            println!("Use --show to display current configuration or --reset to reset to defaults");
        }
        return Ok(());
    }

    let config = AppConfig::load(args.config.as_deref())?.with_overrides(args.server, args.cache);
    debug!(server = %config.remote.base_url, cache = %config.cache_path().display(), "Configuration");
    let executor = CommandExecutor::new(config);

    match args.command {
        Commands::Variants { url, native } => executor.variants(&url, native).await,
        Commands::Steps { json } => executor.steps(json).await,
        Commands::Simulate { step, script } => executor.simulate(&step, &script).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("lesson_player=info,lesson_cli=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .init();
}
