//! Shared types for the mediahub upload/conversion pipeline.
//!
//! This crate holds everything the pipeline and the binary that hosts it need
//! to agree on without depending on any substrate client: configuration,
//! the stream job envelope, and the stub metadata entity.

#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

pub mod config;
pub mod error;
pub mod image;
pub mod job;

pub use config::Config;
pub use error::CoreError;
pub use image::Image;
pub use job::{ConversionJob, StreamEntry};
