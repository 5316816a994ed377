//! Component C — appends conversion jobs to the Redis Stream the worker
//! pool (Component D) consumes.

use std::sync::Arc;

use mediahub_core::job::{ConversionJob, StreamEntry};
use redis::streams::StreamMaxlen;
use redis::AsyncCommands;
use tracing::{debug, instrument};

use crate::error::EngineError;
use crate::holder::ClientHolder;

#[derive(Clone)]
pub struct StreamProducer {
    holder: Arc<ClientHolder>,
    stream: String,
    max_len: i64,
}

impl StreamProducer {
    pub fn new(holder: Arc<ClientHolder>, stream: String, max_len: i64) -> StreamProducer {
        StreamProducer { holder, stream, max_len }
    }

    /// Serializes `job` into a fresh [`StreamEntry`] (attempt 0) and appends
    /// it to the stream, approximately trimmed to `max_len`.
    #[instrument(skip(self, job), fields(stream = %self.stream, key = %job.object_key))]
    pub async fn enqueue_convert(&self, job: &ConversionJob) -> Result<(), EngineError> {
        let entry = StreamEntry::new(job)
            .map_err(|err| EngineError::Permanent(format!("encode conversion job: {err}")))?;

        let mut conn = self.holder.conn();
        let _id: String = conn
            .xadd_maxlen(
                &self.stream,
                StreamMaxlen::Approx(self.max_len.max(0) as usize),
                "*",
                &[("payload", entry.payload.as_str()), ("attempt", "0")],
            )
            .await?;
        debug!("conversion job enqueued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_payload_matches_stream_entry_encoding() {
        let job = ConversionJob {
            object_key: "uploads/abc".into(),
            content_type: "image/png".into(),
            ext: ".png".into(),
            webp_key: None,
        };
        let entry = StreamEntry::new(&job).expect("encode");
        assert_eq!(entry.attempt, 0);
        let round_tripped = entry.job().expect("decode");
        assert_eq!(round_tripped.object_key, job.object_key);
    }
}
