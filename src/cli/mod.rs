//! CLI commands
//!
//! Provides the `detserve` command-line interface.

mod check;
mod models;
mod serve;

pub use check::check;
pub use models::models;
pub use serve::serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// detserve - Pooled object-detection inference server
#[derive(Parser)]
#[command(name = "detserve")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path (falls back to the DETSERVE_CONFIG environment
    /// variable)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the configured model bundles and start the session server
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,
    },

    /// Validate the config without loading any engines
    Check,

    /// List the configured model bundles
    Models,
}
