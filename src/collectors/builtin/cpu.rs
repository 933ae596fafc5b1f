//! CPU collectors.

use super::to_value;
use crate::collectors::{source_fn, CollectorCatalog};
use crate::registry::RegistryError;
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use sysinfo::System;

/// CPU frequency in MHz.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuFreq {
    pub current: Option<u64>,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

pub(super) fn register(catalog: &mut CollectorCatalog, system: Arc<Mutex<System>>) -> Result<(), RegistryError> {
    let brand_sys = system.clone();
    let logical_sys = system.clone();
    let physical_sys = system.clone();
    let percent_sys = system.clone();
    let freq_sys = system;

    catalog
        .add_first_time("cpu_brand", move || {
            let system = brand_sys.clone();
            source_fn(move || {
                let mut sys = system.lock().unwrap_or_else(PoisonError::into_inner);
                sys.refresh_cpu();
                let brand = sys.cpus().first().map(|cpu| cpu.brand().to_string()).unwrap_or_default();
                async move { Ok(json!(clean_brand(&brand))) }
            })
        })?
        .add_first_time("cpu_count_logical", move || {
            let system = logical_sys.clone();
            source_fn(move || {
                let mut sys = system.lock().unwrap_or_else(PoisonError::into_inner);
                sys.refresh_cpu();
                let count = sys.cpus().len();
                async move { Ok(json!(count)) }
            })
        })?
        .add_first_time("cpu_count", move || {
            let system = physical_sys.clone();
            source_fn(move || {
                let count = system
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .physical_core_count();
                async move { Ok(json!(count)) }
            })
        })?
        .add_periodic("cpu_percent", move || {
            let system = percent_sys.clone();
            source_fn(move || {
                let mut sys = system.lock().unwrap_or_else(PoisonError::into_inner);
                sys.refresh_cpu();
                let usage = sys.global_cpu_info().cpu_usage();
                async move { Ok(json!(usage)) }
            })
        })?
        .add_periodic("cpu_freq", move || {
            let system = freq_sys.clone();
            source_fn(move || {
                let mut sys = system.lock().unwrap_or_else(PoisonError::into_inner);
                sys.refresh_cpu();
                let freq = cpu_freq(sys.cpus().iter().map(|cpu| cpu.frequency()));
                async move { to_value(&freq) }
            })
        })?;
    Ok(())
}

/// Strips the clock speed and a trailing "CPU"/"Processor" from a brand string.
pub fn clean_brand(raw: &str) -> String {
    let mut brand = raw.split('@').next().unwrap_or_default().trim().to_string();
    let lower = brand.to_lowercase();
    if lower.ends_with("cpu") || lower.ends_with("processor") {
        if let Some((head, _)) = brand.rsplit_once(char::is_whitespace) {
            brand = head.trim().to_string();
        }
    }
    if brand.is_empty() {
        "Unknown".to_string()
    } else {
        brand
    }
}

/// Summarises per-core frequencies. Zero readings count as unknown.
pub fn cpu_freq(frequencies: impl Iterator<Item = u64>) -> CpuFreq {
    let known: Vec<u64> = frequencies.filter(|&f| f > 0).collect();
    CpuFreq {
        current: (!known.is_empty()).then(|| known.iter().sum::<u64>() / known.len() as u64),
        min: known.iter().min().copied(),
        max: known.iter().max().copied(),
    }
}
