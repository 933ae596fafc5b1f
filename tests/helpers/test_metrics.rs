//! A simple in-memory metrics recorder for testing.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, Unit};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Records counters both under their bare name and under
/// `name{label=value,...}`, and gauges under their bare name.
#[derive(Debug, Clone, Default)]
pub struct TestMetrics {
    counters: Arc<Mutex<HashMap<String, u64>>>,
    gauges: Arc<Mutex<HashMap<String, f64>>>,
}

impl TestMetrics {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or(0)
    }

    pub fn get_gauge(&self, name: &str) -> Option<f64> {
        self.gauges.lock().unwrap().get(name).cloned()
    }

    pub async fn wait_for_counter(&self, name: &str, value: u64, timeout: std::time::Duration) {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if self.get_counter(name) >= value {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!(
            "Timeout waiting for counter '{}' to reach '{}'",
            name, value
        );
    }
}

fn labeled_name(key: &Key) -> Option<String> {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    (!labels.is_empty()).then(|| format!("{}{{{}}}", key.name(), labels.join(",")))
}

impl Recorder for TestMetrics {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: metrics::SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: metrics::SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: metrics::SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata) -> Counter {
        let mut names = vec![key.name().to_string()];
        names.extend(labeled_name(key));
        Counter::from_arc(Arc::new(MetricCounter {
            names,
            counters: self.counters.clone(),
        }))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata) -> Gauge {
        Gauge::from_arc(Arc::new(MetricGauge {
            name: key.name().to_string(),
            gauges: self.gauges.clone(),
        }))
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata) -> Histogram {
        // Not implemented for this test helper
        Histogram::noop()
    }
}

#[derive(Debug)]
struct MetricCounter {
    names: Vec<String>,
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl metrics::CounterFn for MetricCounter {
    fn increment(&self, value: u64) {
        let mut counters = self.counters.lock().unwrap();
        for name in &self.names {
            *counters.entry(name.clone()).or_insert(0) += value;
        }
    }

    fn absolute(&self, _value: u64) {
        // Not implemented
    }
}

#[derive(Debug)]
struct MetricGauge {
    name: String,
    gauges: Arc<Mutex<HashMap<String, f64>>>,
}

impl metrics::GaugeFn for MetricGauge {
    fn increment(&self, value: f64) {
        *self.gauges.lock().unwrap().entry(self.name.clone()).or_insert(0.0) += value;
    }

    fn decrement(&self, value: f64) {
        *self.gauges.lock().unwrap().entry(self.name.clone()).or_insert(0.0) -= value;
    }

    fn set(&self, value: f64) {
        self.gauges.lock().unwrap().insert(self.name.clone(), value);
    }
}
