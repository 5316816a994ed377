//! Component J — the relational metadata store boundary.
//!
//! Schema and migrations are an explicit Non-goal; this module only
//! defines the trait the use-case layer depends on and a no-op
//! implementation that always succeeds, the way the original's own
//! repository stub does, so the pipeline is runnable without a database.

use async_trait::async_trait;
use mediahub_core::Image;

use crate::error::EngineError;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert_image(&self, image: Image) -> Result<Image, EngineError>;
    async fn ping(&self) -> Result<(), EngineError>;
}

/// Always succeeds, returning a zero-valued `Image`. Stands in for the
/// relational store until one is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetadataStore;

#[async_trait]
impl MetadataStore for NoopMetadataStore {
    async fn insert_image(&self, _image: Image) -> Result<Image, EngineError> {
        Ok(Image::default())
    }

    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_store_always_succeeds() {
        let store = NoopMetadataStore;
        let result = store.insert_image(Image { id: 1, ..Default::default() }).await;
        assert!(result.is_ok());
        assert!(store.ping().await.is_ok());
    }
}
