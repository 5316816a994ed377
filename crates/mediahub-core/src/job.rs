//! The conversion job envelope pushed onto, and read back from, the durable stream.

use serde::{Deserialize, Serialize};

/// An immutable record describing a WebP conversion to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionJob {
    #[serde(rename = "object_key")]
    pub object_key: String,
    #[serde(rename = "content_type")]
    pub content_type: String,
    /// Lowercased, includes the leading dot (`.png`, `.jpg`, `.jpeg`, `.webp`).
    pub ext: String,
    #[serde(rename = "webp_key", default, skip_serializing_if = "Option::is_none")]
    pub webp_key: Option<String>,
}

impl ConversionJob {
    /// The key the converted WebP payload should be stored under.
    pub fn target_key(&self) -> String {
        match &self.webp_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => format!("{}.webp", self.object_key),
        }
    }
}

/// The envelope actually stored on the stream: the job payload plus a retry counter.
///
/// `attempt` starts at 0 and strictly increases each time the job is re-enqueued
/// after a failed handling attempt; entries whose `attempt` has reached
/// `max_attempts` are never re-enqueued again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub payload: String,
    pub attempt: u32,
}

impl StreamEntry {
    pub fn new(job: &ConversionJob) -> serde_json::Result<StreamEntry> {
        Ok(StreamEntry { payload: serde_json::to_string(job)?, attempt: 0 })
    }

    pub fn retry(raw_payload: String, attempt: u32) -> StreamEntry {
        StreamEntry { payload: raw_payload, attempt }
    }

    pub fn job(&self) -> serde_json::Result<ConversionJob> {
        serde_json::from_str(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_key_defaults_to_object_key_plus_webp() {
        let job = ConversionJob {
            object_key: "uploads/abc".into(),
            content_type: "image/png".into(),
            ext: ".png".into(),
            webp_key: None,
        };
        assert_eq!(job.target_key(), "uploads/abc.webp");
    }

    #[test]
    fn target_key_honors_explicit_override() {
        let job = ConversionJob {
            object_key: "uploads/abc".into(),
            content_type: "image/png".into(),
            ext: ".png".into(),
            webp_key: Some("derived/override.webp".into()),
        };
        assert_eq!(job.target_key(), "derived/override.webp");
    }

    #[test]
    fn stream_entry_round_trips_through_json() {
        let job = ConversionJob {
            object_key: "uploads/abc".into(),
            content_type: "image/jpeg".into(),
            ext: ".jpg".into(),
            webp_key: None,
        };
        let entry = StreamEntry::new(&job).unwrap();
        assert_eq!(entry.attempt, 0);
        let decoded = entry.job().unwrap();
        assert_eq!(decoded, job);
    }

}
