//! Builtin system collectors, backed by `sysinfo`.
//!
//! [`register_builtin`] adds every builtin collector to a catalog. Which ones
//! actually run is decided by the `collectors.enabled` configuration list.

pub mod cpu;
pub mod disk;
pub mod mem;
pub mod misc;
pub mod network;
pub mod process;

use super::{CollectError, CollectorCatalog};
use crate::config::Config;
use crate::core::CollectorValue;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::System;

/// Registers every builtin collector.
///
/// # Errors
/// Fails on an invalid ignore regex, an invalid proxy URL, or a name clash
/// with an already registered collector.
pub fn register_builtin(catalog: &mut CollectorCatalog, config: &Config) -> Result<()> {
    let collectors = &config.collectors;
    let system = Arc::new(Mutex::new(System::new()));

    cpu::register(catalog, system.clone())?;
    mem::register(catalog, system.clone())?;
    disk::register(
        catalog,
        disk::DiskOptions {
            ignore: compile_patterns(&collectors.ignore_parts).context("invalid `ignore_parts` pattern")?,
            ignore_bad: collectors.ignore_bad_parts,
            sort: collectors.sort_parts,
            io_ignore: compile_patterns(&collectors.ignore_disk_ios).context("invalid `ignore_disk_ios` pattern")?,
            io_ignore_zero: collectors.ignore_zero_io_disks,
            io_sort: collectors.sort_disk_ios,
        },
    )?;
    let proxy = match &config.background.proxy {
        Some(url) => Some(reqwest::Proxy::all(url).context("invalid `background.proxy` URL")?),
        None => None,
    };
    network::register(
        catalog,
        network::NetworkOptions {
            ignore: compile_patterns(&collectors.ignore_nets).context("invalid `ignore_nets` pattern")?,
            ignore_zero_io: collectors.ignore_zero_io_nets,
            sort: collectors.sort_nets,
            test_sites: collectors.test_sites.clone(),
            test_timeout: Duration::from_secs(collectors.test_timeout_seconds),
            sort_sites: collectors.sort_sites,
            proxy,
        },
    )?;
    process::register(
        catalog,
        system,
        process::ProcessOptions {
            ignore: compile_patterns(&collectors.ignore_procs).context("invalid `ignore_procs` pattern")?,
            sort_by: collectors.proc_sort_by,
            limit: collectors.proc_len,
            cpu_max_100p: collectors.proc_cpu_max_100p,
        },
    )?;
    misc::register(catalog)?;
    Ok(())
}

/// Compiles a list of regular expressions.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

/// Checks if `text` matches any of the patterns.
pub fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}

/// Cumulative `(out, in)` byte counters keyed by device name.
pub type ByteCounters = HashMap<String, (u64, u64)>;

/// Options shared by the per-device byte rate collectors.
#[derive(Debug, Clone, Copy)]
pub struct RateFilter<'a> {
    pub ignore: &'a [Regex],
    pub ignore_zero: bool,
    pub sort: bool,
}

/// Per-second rates for devices present in both samples, as
/// `(name, out, in)`.
///
/// Sorted by total throughput (highest first) when `sort` is set, by name
/// otherwise.
pub fn byte_rates(past: &ByteCounters, now: &ByteCounters, elapsed_secs: f64, filter: RateFilter<'_>) -> Vec<(String, f64, f64)> {
    let mut rates: Vec<(String, f64, f64)> = past
        .iter()
        .filter(|(name, _)| !matches_any(filter.ignore, name))
        .filter_map(|(name, &(past_out, past_in))| {
            let &(now_out, now_in) = now.get(name)?;
            let outgoing = now_out.saturating_sub(past_out) as f64 / elapsed_secs;
            let incoming = now_in.saturating_sub(past_in) as f64 / elapsed_secs;
            if filter.ignore_zero && outgoing == 0.0 && incoming == 0.0 {
                return None;
            }
            Some((name.clone(), outgoing, incoming))
        })
        .collect();

    if filter.sort {
        rates.sort_by(|a, b| (b.1 + b.2).total_cmp(&(a.1 + a.2)));
    } else {
        rates.sort_by(|a, b| a.0.cmp(&b.0));
    }
    rates
}

/// Serializes a collector value.
pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<CollectorValue, CollectError> {
    serde_json::to_value(value).map_err(|e| CollectError::Failed(e.into()))
}

/// Formats a duration as `[Nd ]H:MM:SS`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    let clock = format!("{}:{:02}:{:02}", hours, minutes, seconds);
    if days > 0 {
        format!("{}d {}", days, clock)
    } else {
        clock
    }
}
