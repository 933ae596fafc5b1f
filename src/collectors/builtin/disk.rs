//! Disk collectors: partition usage and per-device IO rate.

use super::{byte_rates, matches_any, to_value, ByteCounters, RateFilter};
use crate::collectors::{CollectError, CollectorCatalog, DataSource, DeltaSource};
use crate::core::CollectorValue;
use crate::registry::RegistryError;
use async_trait::async_trait;
use log::warn;
use regex::Regex;
use serde::Serialize;
use std::io::ErrorKind;
use std::sync::Arc;
use sysinfo::Disks;

const DISKSTATS: &str = "/proc/diskstats";
/// `/proc/diskstats` counts sectors of 512 bytes regardless of the device.
const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone)]
pub struct DiskOptions {
    /// Mount points matching any of these are skipped.
    pub ignore: Vec<Regex>,
    /// Drop partitions whose size cannot be read instead of reporting them.
    pub ignore_bad: bool,
    /// Sort by usage percent, highest first.
    pub sort: bool,
    /// Devices matching any of these are skipped by `disk_io`.
    pub io_ignore: Vec<Regex>,
    /// Drop devices that did not read or write since the previous sample.
    pub io_ignore_zero: bool,
    /// Sort `disk_io` by total throughput, highest first.
    pub io_sort: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DiskUsage {
    Normal {
        name: String,
        percent: f64,
        used: u64,
        total: u64,
    },
    WithError {
        name: String,
        exception: String,
    },
}

impl DiskUsage {
    fn percent(&self) -> f64 {
        match self {
            Self::Normal { percent, .. } => *percent,
            Self::WithError { .. } => -1.0,
        }
    }
}

/// Reports usage of every mounted partition.
pub struct DiskUsageSource {
    options: Arc<DiskOptions>,
}

#[async_trait]
impl DataSource for DiskUsageSource {
    async fn fetch(&self) -> Result<CollectorValue, CollectError> {
        let disks = Disks::new_with_refreshed_list();
        let partitions = disks.list().iter().map(|disk| {
            (
                disk.mount_point().display().to_string(),
                disk.total_space(),
                disk.available_space(),
            )
        });
        to_value(&summarize(partitions, &self.options))
    }
}

/// Builds the usage list from `(mount point, total, available)` triples.
pub fn summarize(
    partitions: impl Iterator<Item = (String, u64, u64)>,
    options: &DiskOptions,
) -> Vec<DiskUsage> {
    let mut usage: Vec<DiskUsage> = partitions
        .filter(|(name, _, _)| !matches_any(&options.ignore, name))
        .filter_map(|(name, total, available)| {
            if total == 0 {
                warn!("Failed to read usage of partition {}", name);
                return (!options.ignore_bad).then(|| DiskUsage::WithError {
                    name,
                    exception: "partition size is zero or unreadable".to_string(),
                });
            }
            let used = total.saturating_sub(available);
            Some(DiskUsage::Normal {
                name,
                percent: used as f64 / total as f64 * 100.0,
                used,
                total,
            })
        })
        .collect();

    if options.sort {
        usage.sort_by(|a, b| b.percent().total_cmp(&a.percent()));
    }
    usage
}

/// Throughput of one block device, in bytes per second.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskIo {
    pub name: String,
    pub read: f64,
    pub write: f64,
}

/// Samples block device counters and reports the rate between two samples.
pub struct DiskIoSource {
    options: Arc<DiskOptions>,
}

#[async_trait]
impl DeltaSource for DiskIoSource {
    type Raw = ByteCounters;

    async fn sample(&self) -> Result<ByteCounters, CollectError> {
        match tokio::fs::read_to_string(DISKSTATS).await {
            Ok(raw) => Ok(parse_diskstats(&raw)),
            // No procfs on this platform; report no devices.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ByteCounters::new()),
            Err(e) => Err(CollectError::Failed(e.into())),
        }
    }

    fn calc(&self, past: &ByteCounters, now: &ByteCounters, elapsed_secs: f64) -> Result<CollectorValue, CollectError> {
        to_value(&io_rates(past, now, elapsed_secs, &self.options))
    }
}

/// Parses `/proc/diskstats` into `(bytes written, bytes read)` per device.
///
/// Lines with too few columns or unparsable counters are skipped.
pub fn parse_diskstats(raw: &str) -> ByteCounters {
    raw.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 10 {
                return None;
            }
            let sectors_read: u64 = parts[5].parse().ok()?;
            let sectors_written: u64 = parts[9].parse().ok()?;
            Some((
                parts[2].to_string(),
                (sectors_written * SECTOR_SIZE, sectors_read * SECTOR_SIZE),
            ))
        })
        .collect()
}

/// Computes per-device rates for devices present in both samples.
pub fn io_rates(past: &ByteCounters, now: &ByteCounters, elapsed_secs: f64, options: &DiskOptions) -> Vec<DiskIo> {
    let filter = RateFilter {
        ignore: &options.io_ignore,
        ignore_zero: options.io_ignore_zero,
        sort: options.io_sort,
    };
    byte_rates(past, now, elapsed_secs, filter)
        .into_iter()
        .map(|(name, write, read)| DiskIo { name, read, write })
        .collect()
}

pub(super) fn register(catalog: &mut CollectorCatalog, options: DiskOptions) -> Result<(), RegistryError> {
    let options = Arc::new(options);
    let io_options = options.clone();
    catalog
        .add_periodic("disk_usage", move || DiskUsageSource {
            options: options.clone(),
        })?
        .add_time_delta("disk_io", move || DiskIoSource {
            options: io_options.clone(),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(ignore: &[&str], ignore_bad: bool, sort: bool) -> DiskOptions {
        DiskOptions {
            ignore: ignore.iter().map(|p| Regex::new(p).unwrap()).collect(),
            ignore_bad,
            sort,
            io_ignore: vec![Regex::new("^loop").unwrap()],
            io_ignore_zero: true,
            io_sort: true,
        }
    }

    fn partitions() -> impl Iterator<Item = (String, u64, u64)> {
        vec![
            ("/".to_string(), 100, 75),
            ("/data".to_string(), 100, 10),
            ("/snap/core".to_string(), 100, 0),
            ("/broken".to_string(), 0, 0),
        ]
        .into_iter()
    }

    #[test]
    fn test_sorted_by_percent_with_ignores() {
        let usage = summarize(partitions(), &options(&["^/snap"], false, true));
        let names: Vec<_> = usage
            .iter()
            .map(|u| match u {
                DiskUsage::Normal { name, .. } | DiskUsage::WithError { name, .. } => name.as_str(),
            })
            .collect();
        assert_eq!(names, vec!["/data", "/", "/broken"]);
    }

    #[test]
    fn test_bad_partitions_can_be_dropped() {
        let usage = summarize(partitions(), &options(&[], true, false));
        assert_eq!(usage.len(), 3);
        assert!(usage.iter().all(|u| matches!(u, DiskUsage::Normal { .. })));
    }

    #[test]
    fn test_used_is_total_minus_available() {
        let usage = summarize(vec![("/".to_string(), 200, 50)].into_iter(), &options(&[], false, false));
        assert_eq!(
            usage,
            vec![DiskUsage::Normal {
                name: "/".to_string(),
                percent: 75.0,
                used: 150,
                total: 200
            }]
        );
    }

    const DISKSTATS_SAMPLE: &str = "\
   7       0 loop0 50 0 2000 10 0 0 0 0 0 10 10
   8       0 sda 1200 30 40000 900 800 20 16000 700 0 1500 1600
   8       1 sda1 1100 30 39000 880 790 20 15000 690 0 1400 1570
 259       0 nvme0n1 10 0 80 1 0 0 0 0 0 1 1
bogus line
";

    #[test]
    fn test_parse_diskstats() {
        let counters = parse_diskstats(DISKSTATS_SAMPLE);
        assert_eq!(counters.len(), 4);
        assert_eq!(counters["sda"], (16_000 * 512, 40_000 * 512));
        assert_eq!(counters["nvme0n1"], (0, 80 * 512));
    }

    #[test]
    fn test_disk_io_rates() {
        let past = parse_diskstats(DISKSTATS_SAMPLE);
        let mut now = past.clone();
        now.insert("sda".to_string(), (16_000 * 512 + 2048, 40_000 * 512 + 4096));
        now.insert("sda1".to_string(), (15_000 * 512, 39_000 * 512 + 1024));
        now.insert("loop0".to_string(), (0, 4_000 * 512));

        let rates = io_rates(&past, &now, 2.0, &options(&[], false, false));
        assert_eq!(
            rates,
            vec![
                DiskIo {
                    name: "sda".to_string(),
                    read: 2048.0,
                    write: 1024.0
                },
                DiskIo {
                    name: "sda1".to_string(),
                    read: 512.0,
                    write: 0.0
                },
            ]
        );
    }

    #[test]
    fn test_disk_io_unsorted_keeps_idle_devices() {
        let past = parse_diskstats(DISKSTATS_SAMPLE);
        let mut opts = options(&[], false, false);
        opts.io_ignore_zero = false;
        opts.io_sort = false;
        let names: Vec<_> = io_rates(&past, &past, 1.0, &opts).into_iter().map(|io| io.name).collect();
        assert_eq!(names, vec!["nvme0n1", "sda", "sda1"]);
    }
}
