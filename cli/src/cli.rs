use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "preview-watch", version, about = "Track and poll preview generation jobs")]
pub struct Args {
    /// Config file (defaults to ~/.preview-tracker/config.json when present)
    #[arg(long, global = true, env = "PREVIEW_TRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database holding the job list
    #[arg(long, global = true, env = "PREVIEW_TRACKER_DATABASE")]
    pub database: Option<PathBuf>,

    /// Status endpoint, overriding the config file
    #[arg(long, global = true, env = "PREVIEW_TRACKER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start tracking a preview the server already accepted
    Track {
        #[arg(long)]
        id: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        source_lang: String,
        #[arg(long)]
        target_lang: String,
        #[arg(long)]
        email: Option<String>,
    },

    /// Print every tracked job as JSON
    List,

    /// Print the latest job for a request key, or the preferred job
    Show {
        /// Request key in either the versioned or the legacy encoding
        request_key: Option<String>,
        #[arg(long, conflicts_with = "request_key")]
        preferred: bool,
    },

    /// Stop tracking a job
    Remove { id: String },

    /// Drop stale jobs and re-apply the list cap
    Cleanup,

    /// Poll until no job is active, or until interrupted
    Watch,
}
