//! Top processes by CPU or memory.

use super::{matches_any, to_value};
use crate::collectors::{source_fn, CollectorCatalog};
use crate::registry::RegistryError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use sysinfo::System;

/// Key `process_status` orders processes by, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessSortKey {
    #[default]
    Cpu,
    Mem,
}

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Process names matching any of these are skipped.
    pub ignore: Vec<Regex>,
    pub sort_by: ProcessSortKey,
    /// Maximum number of processes reported. Zero disables the collector.
    pub limit: usize,
    /// Divide CPU usage by the logical core count so it tops out at 100.
    pub cpu_max_100p: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessStatus {
    pub name: String,
    /// CPU usage percent.
    pub cpu: f64,
    /// Resident memory in bytes.
    pub mem: u64,
}

/// Filters, orders and truncates `(name, cpu, mem)` triples.
pub fn top_processes(
    processes: impl Iterator<Item = (String, f64, u64)>,
    cpu_count: usize,
    options: &ProcessOptions,
) -> Vec<ProcessStatus> {
    if options.limit == 0 {
        return Vec::new();
    }
    let divisor = if options.cpu_max_100p { cpu_count.max(1) as f64 } else { 1.0 };
    let mut list: Vec<ProcessStatus> = processes
        .filter(|(name, _, _)| !matches_any(&options.ignore, name))
        .map(|(name, cpu, mem)| ProcessStatus {
            name,
            cpu: cpu / divisor,
            mem,
        })
        .collect();

    match options.sort_by {
        ProcessSortKey::Cpu => list.sort_by(|a, b| b.cpu.total_cmp(&a.cpu)),
        ProcessSortKey::Mem => list.sort_by(|a, b| b.mem.cmp(&a.mem)),
    }
    list.truncate(options.limit);
    list
}

pub(super) fn register(
    catalog: &mut CollectorCatalog,
    system: Arc<Mutex<System>>,
    options: ProcessOptions,
) -> Result<(), RegistryError> {
    let options = Arc::new(options);
    catalog.add_periodic("process_status", move || {
        let system = system.clone();
        let options = options.clone();
        source_fn(move || {
            let mut sys = system.lock().unwrap_or_else(PoisonError::into_inner);
            if sys.cpus().is_empty() {
                sys.refresh_cpu();
            }
            // CPU usage is measured between two refreshes; the first round reports zero.
            sys.refresh_processes();
            let processes = sys
                .processes()
                .values()
                .map(|p| (p.name().to_string(), f64::from(p.cpu_usage()), p.memory()));
            let list = top_processes(processes, sys.cpus().len(), &options);
            async move { to_value(&list) }
        })
    })?;
    Ok(())
}
