//! Network collectors: per-interface IO rate and connectivity checks.

use super::{byte_rates, to_value, ByteCounters, RateFilter};
use crate::collectors::{CollectError, CollectorCatalog, DataSource, DeltaSource};
use crate::config::TestSite;
use crate::core::CollectorValue;
use crate::registry::RegistryError;
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::Networks;

#[derive(Debug, Clone)]
pub struct NetworkOptions {
    /// Interfaces matching any of these are skipped.
    pub ignore: Vec<Regex>,
    /// Drop interfaces that moved no bytes since the previous sample.
    pub ignore_zero_io: bool,
    /// Sort by total throughput, highest first.
    pub sort: bool,
    pub test_sites: Vec<TestSite>,
    pub test_timeout: Duration,
    /// Order site checks by latency instead of configuration order.
    pub sort_sites: bool,
    /// Proxy used by sites with `use_proxy` set.
    pub proxy: Option<reqwest::Proxy>,
}

/// Throughput of one interface, in bytes per second.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkIo {
    pub name: String,
    pub sent: f64,
    pub recv: f64,
}

/// Cumulative `(transmitted, received)` byte counters per interface.
pub type NetCounters = ByteCounters;

/// Samples interface counters and reports the rate between two samples.
pub struct NetworkIoSource {
    options: Arc<NetworkOptions>,
}

#[async_trait]
impl DeltaSource for NetworkIoSource {
    type Raw = NetCounters;

    async fn sample(&self) -> Result<NetCounters, CollectError> {
        let networks = Networks::new_with_refreshed_list();
        Ok(networks
            .iter()
            .map(|(name, data)| (name.clone(), (data.total_transmitted(), data.total_received())))
            .collect())
    }

    fn calc(&self, past: &NetCounters, now: &NetCounters, elapsed_secs: f64) -> Result<CollectorValue, CollectError> {
        to_value(&io_rates(past, now, elapsed_secs, &self.options))
    }
}

/// Computes per-interface rates for interfaces present in both samples.
pub fn io_rates(past: &NetCounters, now: &NetCounters, elapsed_secs: f64, options: &NetworkOptions) -> Vec<NetworkIo> {
    let filter = RateFilter {
        ignore: &options.ignore,
        ignore_zero: options.ignore_zero_io,
        sort: options.sort,
    };
    byte_rates(past, now, elapsed_secs, filter)
        .into_iter()
        .map(|(name, sent, recv)| NetworkIo { name, sent, recv })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NetworkConnection {
    Ok {
        name: String,
        status: u16,
        reason: String,
        delay_ms: f64,
    },
    Error {
        name: String,
        error: String,
    },
}

impl NetworkConnection {
    /// Latency used for ordering. Failed checks sort first.
    fn sort_key(&self) -> f64 {
        match self {
            Self::Ok { delay_ms, .. } => *delay_ms,
            Self::Error { .. } => -1.0,
        }
    }
}

/// Orders site checks by latency, failed checks first.
pub fn sort_by_delay(results: &mut [NetworkConnection]) {
    results.sort_by(|a, b| a.sort_key().total_cmp(&b.sort_key()));
}

/// Checks each configured test site with a GET request.
pub struct NetworkConnectionSource {
    options: Arc<NetworkOptions>,
}

impl NetworkConnectionSource {
    async fn check_site(client: &reqwest::Client, site: &TestSite) -> NetworkConnection {
        let start = Instant::now();
        match client.get(&site.url).send().await {
            Ok(resp) => NetworkConnection::Ok {
                name: site.name.clone(),
                status: resp.status().as_u16(),
                reason: resp.status().canonical_reason().unwrap_or_default().to_string(),
                delay_ms: start.elapsed().as_secs_f64() * 1000.0,
            },
            Err(e) => NetworkConnection::Error {
                name: site.name.clone(),
                error: if e.is_timeout() {
                    "Timeout".to_string()
                } else if e.is_connect() {
                    "ConnectError".to_string()
                } else {
                    "RequestError".to_string()
                },
            },
        }
    }
}

#[async_trait]
impl DataSource for NetworkConnectionSource {
    async fn fetch(&self) -> Result<CollectorValue, CollectError> {
        let builder = || reqwest::Client::builder().timeout(self.options.test_timeout);
        let direct = builder().no_proxy().build().map_err(|e| CollectError::Failed(e.into()))?;
        let proxied = match &self.options.proxy {
            Some(proxy) if self.options.test_sites.iter().any(|site| site.use_proxy) => Some(
                builder()
                    .proxy(proxy.clone())
                    .build()
                    .map_err(|e| CollectError::Failed(e.into()))?,
            ),
            _ => None,
        };

        let checks = self.options.test_sites.iter().map(|site| {
            let client = match &proxied {
                Some(client) if site.use_proxy => client,
                _ => &direct,
            };
            Self::check_site(client, site)
        });
        let mut results = join_all(checks).await;
        if self.options.sort_sites {
            sort_by_delay(&mut results);
        }
        to_value(&results)
    }
}

pub(super) fn register(catalog: &mut CollectorCatalog, options: NetworkOptions) -> Result<(), RegistryError> {
    let options = Arc::new(options);
    let io_options = options.clone();
    catalog
        .add_time_delta("network_io", move || NetworkIoSource {
            options: io_options.clone(),
        })?
        .add_normal("network_connection", move || NetworkConnectionSource {
            options: options.clone(),
        })?;
    Ok(())
}
