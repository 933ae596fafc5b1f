//! Providers downloading images over HTTP.

use super::{BgProvider, BgSink, ProviderError};
use crate::core::{BgImage, PLACEHOLDER_MIME};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

pub const LOLI_URL: &str = "https://www.loliapi.com/acg/pe/";
pub const LOLICON_API_URL: &str = "https://api.lolicon.app/setu/v2";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
const PIXIV_REFERER: &str = "https://www.pixiv.net/";

/// Shared HTTP settings of the builtin providers.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub proxy: Option<String>,
    /// Simultaneous downloads allowed within one `provide` call.
    pub max_concurrent: usize,
}

impl HttpSettings {
    /// Builds a client following redirects, with the configured timeout and proxy.
    pub fn client(&self) -> Result<reqwest::Client, ProviderError> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(builder.build()?)
    }
}

/// Sends `request` and turns a successful response into an image.
async fn download(request: reqwest::RequestBuilder) -> Result<BgImage, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }
    let mime = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(PLACEHOLDER_MIME)
        .to_string();
    let data = response.bytes().await?;
    Ok(BgImage::bytes(data.to_vec(), mime))
}

/// Runs `fetch` `count` times with at most `limit` in flight, pushing every
/// success into `sink`.
///
/// Individual failures are logged and skipped. The last error is returned
/// only when nothing at all was delivered.
async fn fetch_concurrently<F, Fut>(
    provider: &str,
    count: usize,
    limit: usize,
    sink: &BgSink,
    fetch: F,
) -> Result<(), ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<BgImage, ProviderError>>,
{
    let delivered = AtomicUsize::new(0);
    let last_error: Mutex<Option<ProviderError>> = Mutex::new(None);

    stream::iter(0..count)
        .for_each_concurrent(limit.max(1), |_| async {
            match fetch().await {
                Ok(image) => {
                    if sink.push(image).await {
                        delivered.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    warn!(provider, error = %e, "Failed to download background image");
                    *last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
                }
            }
        })
        .await;

    let delivered = delivered.into_inner();
    debug!(provider, requested = count, delivered, "Download round finished");
    match last_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
        Some(e) if delivered == 0 => Err(e),
        _ => Ok(()),
    }
}

/// Downloads every image from one fixed URL.
#[derive(Debug, Clone)]
pub struct UrlProvider {
    name: String,
    url: String,
    client: reqwest::Client,
    max_concurrent: usize,
}

impl UrlProvider {
    pub fn new(name: &str, url: &str, client: reqwest::Client, max_concurrent: usize) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
            max_concurrent,
        }
    }
}

#[async_trait]
impl BgProvider for UrlProvider {
    async fn provide(&self, count: usize, sink: BgSink) -> Result<(), ProviderError> {
        fetch_concurrently(&self.name, count, self.max_concurrent, &sink, || {
            download(self.client.get(&self.url))
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct LoliconResponse {
    data: Vec<LoliconImage>,
}

#[derive(Debug, Deserialize)]
struct LoliconImage {
    urls: LoliconUrls,
}

#[derive(Debug, Deserialize)]
struct LoliconUrls {
    original: String,
}

/// Asks the lolicon API for an image URL, then downloads it.
#[derive(Debug, Clone)]
pub struct LoliconProvider {
    api_url: String,
    r18: u8,
    client: reqwest::Client,
    max_concurrent: usize,
}

impl LoliconProvider {
    pub fn new(api_url: &str, r18: u8, client: reqwest::Client, max_concurrent: usize) -> Self {
        Self {
            api_url: api_url.to_string(),
            r18,
            client,
            max_concurrent,
        }
    }

    async fn fetch_one(&self) -> Result<BgImage, ProviderError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("r18", self.r18.to_string().as_str()),
                ("proxy", "false"),
                ("excludeAI", "true"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        let body: LoliconResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let image = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no image in response".to_string()))?;

        download(
            self.client
                .get(&image.urls.original)
                .header(USER_AGENT, BROWSER_USER_AGENT)
                .header(REFERER, PIXIV_REFERER),
        )
        .await
    }
}

#[async_trait]
impl BgProvider for LoliconProvider {
    async fn provide(&self, count: usize, sink: BgSink) -> Result<(), ProviderError> {
        fetch_concurrently("lolicon", count, self.max_concurrent, &sink, || self.fetch_one()).await
    }
}
