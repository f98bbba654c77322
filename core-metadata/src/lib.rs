//! # Video Metadata Module
//!
//! Derives catalog metadata from video files and streams:
//! - Duration probing
//! - Thumbnail frame extraction with timeout and bounded retry

pub mod error;
pub mod extractor;

pub use error::{MetadataError, Result};
pub use extractor::MetadataExtractor;
