use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "lesson",
    version,
    about = "Inspect lesson sequences and replay player sessions"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Base URL of the lessons/progress service
    #[arg(long, global = true, env = "LESSON_SERVER")]
    pub server: Option<String>,

    /// Local progress cache file
    #[arg(long, global = true, env = "LESSON_CACHE")]
    pub cache: Option<PathBuf>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve a media URL and list its quality variants
    Variants {
        /// Manifest or progressive file URL
        url: String,

        /// Treat adaptive sources as natively playable
        #[arg(long)]
        native: bool,
    },

    /// List every step with its completion and lock state
    Steps {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Replay a scripted playback session and print every player event
    Simulate {
        /// Step to activate
        step: String,

        /// Script file, one command per line
        #[arg(short, long)]
        script: PathBuf,
    },

    /// Show or reset the configuration file
    Config {
        #[arg(long)]
        show: bool,

        #[arg(long)]
        reset: bool,
    },
}
