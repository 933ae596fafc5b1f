//! Uptime, OS, clock and version collectors.

use super::format_duration;
use crate::collectors::{source_fn, CollectorCatalog};
use crate::registry::RegistryError;
use serde_json::json;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use sysinfo::System;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// When the application started. Pinned the first time it is read.
pub fn process_start() -> Instant {
    *PROCESS_START.get_or_init(Instant::now)
}

pub(super) fn register(catalog: &mut CollectorCatalog) -> Result<(), RegistryError> {
    process_start();

    catalog
        .add_normal("system_run_time", || {
            source_fn(|| async { Ok(json!(format_duration(Duration::from_secs(System::uptime())))) })
        })?
        .add_normal("app_run_time", || {
            source_fn(|| async { Ok(json!(format_duration(process_start().elapsed()))) })
        })?
        .add_first_time("system_name", || {
            source_fn(|| async {
                let name = System::long_os_version()
                    .or_else(System::name)
                    .unwrap_or_else(|| "Unknown".to_string());
                Ok(json!(name))
            })
        })?
        .add_first_time("ps_version", || {
            source_fn(|| async { Ok(json!(env!("CARGO_PKG_VERSION"))) })
        })?
        .add_periodic("time", || {
            source_fn(|| async { Ok(json!(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string())) })
        })?;
    Ok(())
}
