use std::path::PathBuf;
use std::process;

use clap::Parser;
use lms_server::{AppState, LmsServer, ServerConfig, ServerResult};
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "lms-server", version, about = "Lessons, progress and settings service")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 4000)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "LMS_BIND_ADDRESS", default_value = "0.0.0.0")]
    bind: String,

    /// JSON file with lessons to serve instead of the bundled samples
    #[arg(long, env = "LMS_LESSONS")]
    lessons: Option<PathBuf>,

    /// Start with the global seeking lock enabled
    #[arg(long)]
    prevent_seeking: bool,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Server error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> ServerResult<()> {
    let state = match &args.lessons {
        Some(path) => AppState::from_file(path)?,
        None => AppState::seeded()?,
    };
    if args.prevent_seeking {
        state.update_settings(&serde_json::json!({ "preventSeeking": true }));
    }
    info!(
        lessons = state.lessons().len(),
        settings = ?state.settings(),
        "Starting LMS server"
    );

    let config = ServerConfig {
        bind_address: args.bind,
        port: args.port,
        enable_cors: !args.no_cors,
    };
    let server = LmsServer::new(config, state);
    let token = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    server.run().await
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("lms_server=info,tower_http=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(verbose))
        .init();
}
