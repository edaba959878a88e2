use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "notesync")]
#[command(about = "Offline-first notes that sync when the server is reachable")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the offline queue database
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Skip the reachability probe and queue every change locally
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        #[arg(short, long, default_value = "")]
        title: String,
        /// Note content (read from stdin or $EDITOR when omitted)
        content: Vec<String>,
    },
    /// Edit an existing note
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// Replace the title
        #[arg(short, long)]
        title: Option<String>,
        /// Replace the content (opens $EDITOR when omitted)
        content: Vec<String>,
    },
    /// Delete a note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// List notes, newest first
    List {
        /// Only notes whose title or content contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single note
    Show {
        /// Note ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay queued changes against the server
    Sync,
    /// Show connectivity and pending queue counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep running, syncing whenever the server becomes reachable
    Watch,
    /// Manage client configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Create or update the config file
    Init {
        /// Remote note service base URL (e.g. <https://notes.example.com>)
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
        /// Offline queue database path
        #[arg(long, value_name = "PATH")]
        db_path: Option<PathBuf>,
        /// Timeout for every remote call, in seconds
        #[arg(long, value_name = "SECS")]
        request_timeout: Option<u64>,
        /// Connectivity probe interval for `watch`, in seconds
        #[arg(long, value_name = "SECS")]
        probe_interval: Option<u64>,
    },
}
