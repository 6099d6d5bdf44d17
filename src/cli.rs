use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "social-collector", about = "Incremental Instagram, Twitter and RSS fetch workers")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration file
    Validate,

    /// Enqueue a collector job from a JSON file onto the fetcher queue of its source type
    Enqueue {
        /// Path to a JSON collector job payload
        file: PathBuf,
    },

    /// Print job counts per queue and state
    Stats,
}
