//! Component F — the upload use-case: decode the incoming bytes just
//! enough to know their dimensions, hand the original off to the object
//! store, and once that admission succeeds, enqueue a conversion job and
//! record the metadata row.
//!
//! Grounded on the original's `useCase.UploadImage` / `processImage`: read
//! the whole payload, probe width/height via the decoder, store under a
//! generated key, then persist. The original's `"sample3"` literal
//! placeholder key is replaced here with a generated UUID v4 (see
//! DESIGN.md) — everything else about the ordering is unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use mediahub_core::{ConversionJob, Image};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::converter;
use crate::error::EngineError;
use crate::metadata_store::MetadataStore;
use crate::object_store::{ObjectStore, SuccessHook};
use crate::producer::StreamProducer;

/// Invokes the producer once the originating upload has landed in the
/// object store. Enqueue failures are logged and swallowed — spec §9
/// resolves this explicitly: a hook failure must never fail the upload
/// that triggered it.
struct EnqueueConversionHook {
    producer: Arc<StreamProducer>,
    job: ConversionJob,
}

#[async_trait]
impl SuccessHook for EnqueueConversionHook {
    async fn call(&self) {
        if let Err(err) = self.producer.enqueue_convert(&self.job).await {
            warn!(key = %self.job.object_key, error = %err, "failed to enqueue conversion job after upload");
        }
    }
}

pub struct UploadUseCase {
    store: ObjectStore,
    producer: Arc<StreamProducer>,
    metadata_store: Arc<dyn MetadataStore>,
}

/// Normalizes a client-supplied filename or content-type hint to the
/// lowercase, dot-prefixed extension the converter and conversion job
/// payload expect.
fn normalize_ext(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    format!(".{trimmed}")
}

impl UploadUseCase {
    pub fn new(
        store: ObjectStore,
        producer: Arc<StreamProducer>,
        metadata_store: Arc<dyn MetadataStore>,
    ) -> UploadUseCase {
        UploadUseCase { store, producer, metadata_store }
    }

    /// Decodes `bytes` to probe its dimensions, stores the original under a
    /// freshly generated key, enqueues a conversion job on success, and
    /// persists the resulting metadata row.
    #[instrument(skip(self, bytes), fields(ext = %ext, content_type = %content_type, size = bytes.len()))]
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        ext: &str,
        content_type: &str,
        cancellation: CancellationToken,
    ) -> Result<Image, EngineError> {
        let ext = normalize_ext(ext);
        let decoded = converter::decode_by_ext(&bytes, &ext)?;
        let (width, height) = (decoded.width() as i32, decoded.height() as i32);

        let key = format!("uploads/{}", uuid_v4());
        let size = bytes.len() as i64;

        let job = ConversionJob {
            object_key: key.clone(),
            content_type: content_type.to_string(),
            ext: ext.clone(),
            webp_key: None,
        };
        let hook = Arc::new(EnqueueConversionHook { producer: self.producer.clone(), job });

        self.store.upload_with_hook(
            key.clone(),
            content_type.to_string(),
            bytes,
            Some(hook),
            cancellation,
        )?;

        let image = Image {
            context: String::new(),
            width,
            height,
            project: String::new(),
            size,
            key,
            mime_type: content_type.to_string(),
            ..Image::default()
        };

        self.metadata_store.insert_image(image).await
    }
}

/// A UUID v4 built from the crate's existing `rand` dependency, avoiding a
/// dedicated `uuid` crate for a single random-identifier call site.
fn uuid_v4() -> String {
    let mut bytes = [0u8; 16];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_ext_adds_missing_dot_and_lowercases() {
        assert_eq!(normalize_ext("PNG"), ".png");
        assert_eq!(normalize_ext(".JPG"), ".jpg");
        assert_eq!(normalize_ext(" .webp "), ".webp");
    }

    #[test]
    fn uuid_v4_has_expected_shape() {
        let id = uuid_v4();
        assert_eq!(id.len(), 36);
        assert_eq!(id.chars().nth(14), Some('4'));
    }
}
