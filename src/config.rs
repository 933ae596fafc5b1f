//! Configuration management for picstatus
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer a `picstatus.toml` file, `PICSTATUS_` environment variables
//! and command-line arguments over the built-in defaults.

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::cli::Cli;
use crate::collectors::builtin::process::ProcessSortKey;

/// Config file read when `--config` is not given. A missing file is ignored.
pub const DEFAULT_CONFIG_FILE: &str = "picstatus.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application, used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Configuration for the collector framework.
    pub collectors: CollectorsConfig,
    /// Configuration for background images.
    pub background: BackgroundConfig,
}

/// Configuration for the collector framework and the builtin collectors.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CollectorsConfig {
    /// Names of the collectors to instantiate, in snapshot order.
    pub enabled: Vec<String>,
    /// Seconds between two ticks of the periodic collectors.
    pub interval_seconds: u64,
    /// History capacity for periodic collectors without an override.
    pub default_history_size: usize,
    /// Per-collector history capacity overrides.
    pub history_size: HashMap<String, usize>,
    /// Regexes on interface names excluded from `network_io`.
    pub ignore_nets: Vec<String>,
    pub ignore_zero_io_nets: bool,
    pub sort_nets: bool,
    /// Regexes on mount points excluded from `disk_usage`.
    pub ignore_parts: Vec<String>,
    pub ignore_bad_parts: bool,
    pub sort_parts: bool,
    /// Regexes on block device names excluded from `disk_io`.
    pub ignore_disk_ios: Vec<String>,
    pub ignore_zero_io_disks: bool,
    pub sort_disk_ios: bool,
    /// Number of processes reported by `process_status`. Zero reports none.
    pub proc_len: usize,
    /// Regexes on process names excluded from `process_status`.
    pub ignore_procs: Vec<String>,
    pub proc_sort_by: ProcessSortKey,
    /// Scale per-process CPU usage to at most 100 percent.
    pub proc_cpu_max_100p: bool,
    /// Timeout of one connectivity check.
    pub test_timeout_seconds: u64,
    /// Order `network_connection` results by latency.
    pub sort_sites: bool,
    /// Sites checked by `network_connection`.
    pub test_sites: Vec<TestSite>,
}

/// A site checked by the `network_connection` collector.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TestSite {
    pub name: String,
    pub url: String,
    /// Route the check through `background.proxy`.
    #[serde(default)]
    pub use_proxy: bool,
}

/// Configuration for background image acquisition.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BackgroundConfig {
    /// Name of the active provider.
    pub provider: String,
    /// Target length of the preload queue. Zero disables preloading.
    pub preload_count: usize,
    /// Directory (or single file) used by the `local` provider.
    pub local_path: PathBuf,
    /// Directory holding preloaded images. Purged at startup.
    pub cache_dir: PathBuf,
    /// Ceiling on how long a request waits when the queue is empty.
    pub fire_timeout_seconds: u64,
    /// Timeout of one HTTP request made by a provider.
    pub request_timeout_seconds: u64,
    /// Simultaneous downloads allowed within one fetch task.
    pub max_concurrent_downloads: usize,
    /// Pause before retrying a refill round that delivered nothing.
    pub refill_retry_ms: u64,
    /// Optional proxy URL for provider requests.
    pub proxy: Option<String>,
    /// `r18` parameter sent to the lolicon API (0, 1 or 2).
    pub lolicon_r18: u8,
    /// Extra providers returning an image from a fixed URL.
    pub custom: Vec<CustomProvider>,
}

/// A user-defined provider that downloads an image from a fixed URL.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CustomProvider {
    pub name: String,
    pub url: String,
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Layers, lowest priority first: defaults, the TOML file given by
    /// `--config` (or `picstatus.toml`), `PICSTATUS_*` environment variables
    /// (`__` separates nested keys), command-line arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // e.g. PICSTATUS_BACKGROUND__PRELOAD_COUNT=3
            .merge(Env::prefixed("PICSTATUS_").split("__"))
            .merge(cli.clone())
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.collectors.interval_seconds == 0 {
            bail!("`collectors.interval_seconds` must be at least 1");
        }
        if self.background.max_concurrent_downloads == 0 {
            bail!("`background.max_concurrent_downloads` must be at least 1");
        }
        if self.background.provider.is_empty() {
            bail!("`background.provider` must not be empty");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            collectors: CollectorsConfig::default(),
            background: BackgroundConfig::default(),
        }
    }
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        let enabled = [
            "cpu_brand",
            "cpu_count_logical",
            "cpu_count",
            "cpu_percent",
            "cpu_freq",
            "memory_stat",
            "swap_stat",
            "disk_usage",
            "disk_io",
            "network_io",
            "network_connection",
            "system_run_time",
            "app_run_time",
            "system_name",
            "ps_version",
            "time",
            "process_status",
        ];
        Self {
            enabled: enabled.iter().map(|s| s.to_string()).collect(),
            interval_seconds: 2,
            default_history_size: 1,
            history_size: HashMap::new(),
            ignore_nets: vec![r"^lo$".to_string(), r"^docker\d*".to_string(), r"^veth".to_string()],
            ignore_zero_io_nets: true,
            sort_nets: true,
            ignore_parts: Vec::new(),
            ignore_bad_parts: false,
            sort_parts: true,
            ignore_disk_ios: vec![r"^loop\d*".to_string(), r"^ram\d*".to_string()],
            ignore_zero_io_disks: false,
            sort_disk_ios: true,
            proc_len: 5,
            ignore_procs: vec![r"^System Idle Process$".to_string()],
            proc_sort_by: ProcessSortKey::Cpu,
            proc_cpu_max_100p: false,
            test_timeout_seconds: 5,
            sort_sites: true,
            test_sites: vec![
                TestSite {
                    name: "Baidu".to_string(),
                    url: "https://www.baidu.com/".to_string(),
                    use_proxy: false,
                },
                TestSite {
                    name: "Google".to_string(),
                    url: "https://www.google.com/".to_string(),
                    use_proxy: true,
                },
            ],
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            provider: "loli".to_string(),
            preload_count: 1,
            local_path: PathBuf::from("backgrounds"),
            cache_dir: std::env::temp_dir().join("picstatus-bg-cache"),
            fire_timeout_seconds: 15,
            request_timeout_seconds: 10,
            max_concurrent_downloads: 4,
            refill_retry_ms: 1000,
            proxy: None,
            lolicon_r18: 0,
            custom: Vec::new(),
        }
    }
}
