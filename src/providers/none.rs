use super::{BgProvider, BgSink, ProviderError};
use crate::core::BgImage;
use async_trait::async_trait;

/// Yields placeholder images only, for setups without backgrounds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneProvider;

#[async_trait]
impl BgProvider for NoneProvider {
    async fn provide(&self, count: usize, sink: BgSink) -> Result<(), ProviderError> {
        for _ in 0..count {
            if !sink.push(BgImage::placeholder()).await {
                break;
            }
        }
        Ok(())
    }
}
