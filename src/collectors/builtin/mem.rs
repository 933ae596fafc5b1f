//! Memory and swap collectors.

use super::to_value;
use crate::collectors::{source_fn, CollectorCatalog, DataSource};
use crate::registry::RegistryError;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use sysinfo::System;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStat {
    pub percent: f64,
    pub used: u64,
    pub total: u64,
}

impl MemoryStat {
    pub fn new(used: u64, total: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };
        Self {
            percent,
            used,
            total,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pool {
    Memory,
    Swap,
}

fn memory_source(system: Arc<Mutex<System>>, pool: Pool) -> impl DataSource {
    source_fn(move || {
        let mut sys = system.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_memory();
        let stat = match pool {
            Pool::Memory => MemoryStat::new(sys.used_memory(), sys.total_memory()),
            Pool::Swap => MemoryStat::new(sys.used_swap(), sys.total_swap()),
        };
        async move { to_value(&stat) }
    })
}

pub(super) fn register(catalog: &mut CollectorCatalog, system: Arc<Mutex<System>>) -> Result<(), RegistryError> {
    for (name, pool) in [
        ("memory_stat", Pool::Memory),
        ("swap_stat", Pool::Swap),
    ] {
        let normal_sys = system.clone();
        let periodic_sys = system.clone();
        catalog
            .add_normal(name, move || memory_source(normal_sys.clone(), pool))?
            .add_periodic(&format!("{}_periodic", name), move || {
                memory_source(periodic_sys.clone(), pool)
            })?;
    }
    Ok(())
}
