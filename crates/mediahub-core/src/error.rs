//! Configuration-layer error type.
//!
//! Pipeline-level errors (admission, substrate, conversion) live in
//! `mediahub-engine`; this crate only needs to report config problems,
//! since those are fatal before any component starts.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse { path: String, source: serde_json::Error },

    #[error("missing required config field: {0}")]
    MissingField(&'static str),
}
