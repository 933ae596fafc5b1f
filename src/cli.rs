//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged over
//! the configuration from the `picstatus.toml` file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Collects system status snapshots with a preloaded background image.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Name of the background provider to use.
    #[arg(long, value_name = "NAME")]
    pub provider: Option<String>,

    /// Number of background images kept ready.
    #[arg(long, value_name = "N")]
    pub preload_count: Option<usize>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Print a single snapshot and exit.
    #[arg(long, conflicts_with = "every")]
    pub once: bool,

    /// Print a snapshot every SECONDS until interrupted.
    #[arg(long, value_name = "SECONDS")]
    pub every: Option<u64>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut background = Dict::new();
        if let Some(provider) = &self.provider {
            background.insert("provider".into(), Value::from(provider.clone()));
        }
        if let Some(count) = self.preload_count {
            background.insert("preload_count".into(), Value::from(count as u64));
        }
        if !background.is_empty() {
            dict.insert("background".into(), Value::from(background));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
