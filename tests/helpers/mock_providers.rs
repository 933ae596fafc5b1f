//! Scripted background providers for tests.

use async_trait::async_trait;
use picstatus::core::BgImage;
use picstatus::providers::{BgProvider, BgSink, ProviderError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fails every call.
#[derive(Debug, Default)]
pub struct FailingProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl BgProvider for FailingProvider {
    async fn provide(&self, _count: usize, _sink: BgSink) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::InvalidResponse("always broken".to_string()))
    }
}

/// Delivers at most `per_call` images per request, each tagged with a
/// running sequence number.
#[derive(Debug)]
pub struct UnderDeliveringProvider {
    per_call: usize,
    next: AtomicUsize,
    pub requested: Mutex<Vec<usize>>,
}

impl UnderDeliveringProvider {
    pub fn new(per_call: usize) -> Self {
        Self {
            per_call,
            next: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<usize> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl BgProvider for UnderDeliveringProvider {
    async fn provide(&self, count: usize, sink: BgSink) -> Result<(), ProviderError> {
        self.requested.lock().unwrap().push(count);
        for _ in 0..count.min(self.per_call) {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            if !sink.push(BgImage::bytes(vec![n as u8], "image/png")).await {
                break;
            }
        }
        Ok(())
    }
}

/// Waits `delay` before delivering one image per request.
#[derive(Debug)]
pub struct SlowProvider {
    delay: Duration,
    pub finished: AtomicUsize,
}

impl SlowProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            finished: AtomicUsize::new(0),
        }
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BgProvider for SlowProvider {
    async fn provide(&self, count: usize, sink: BgSink) -> Result<(), ProviderError> {
        tokio::time::sleep(self.delay).await;
        for _ in 0..count {
            if !sink.push(BgImage::bytes(b"slow".to_vec(), "image/jpeg")).await {
                break;
            }
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// The first call waits `stall` and delivers nothing. Every later call
/// delivers the full count right away.
#[derive(Debug)]
pub struct StallingProvider {
    stall: Duration,
    pub calls: AtomicUsize,
}

impl StallingProvider {
    pub fn new(stall: Duration) -> Self {
        Self {
            stall,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BgProvider for StallingProvider {
    async fn provide(&self, count: usize, sink: BgSink) -> Result<(), ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(self.stall).await;
            return Ok(());
        }
        for _ in 0..count {
            if !sink.push(BgImage::bytes(b"steady".to_vec(), "image/png")).await {
                break;
            }
        }
        Ok(())
    }
}
