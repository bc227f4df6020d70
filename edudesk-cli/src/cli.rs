//! Command line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// API base URL (falls back to EDUDESK_BASE_URL, then localhost).
    #[arg(long, env = "EDUDESK_BASE_URL")]
    pub base_url: Option<String>,

    /// File the credential pair is persisted in.
    #[arg(long, env = "EDUDESK_TOKEN_FILE", default_value = "edudesk-tokens.json")]
    pub token_file: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one reachability probe against the backend.
    Ping,

    /// Watch the debounced link state until interrupted.
    Watch {
        /// Seconds between scheduled probes.
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Send one authenticated API request and print the response body.
    Call {
        /// HTTP method (GET, POST, ...).
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request path, joined against the base URL.
        path: String,

        /// JSON request body.
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Store a credential pair for later calls.
    Login {
        /// Access token.
        access: String,
        /// Refresh token.
        refresh: String,
    },

    /// Clear the stored credential pair.
    Logout,
}
