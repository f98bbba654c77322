//! # Remote Storage Provider
//!
//! Integration with a remote object store that is reachable only through a
//! list/upload HTTP API.
//!
//! ## Overview
//!
//! This module provides:
//! - [`AlistClient`]: `RemoteStorage` over the `/api/fs/list` and `/api/fs/put` endpoints
//! - [`RemoteListingCache`]: TTL cached, coalesced directory listings and recursive walks
//! - [`SignedUrlBroker`]: cached, coalesced signed access URLs for videos and thumbnails
//! - [`RemoteUploader`]: uploads that skip files already present with the same size
//! - [`TtlCache`]: the clock-driven cache both services are built on

pub mod client;
pub mod error;
pub mod listing_cache;
pub mod remote_path;
pub mod signed_url;
pub mod ttl_cache;
pub mod types;
pub mod uploader;

pub use client::AlistClient;
pub use error::{ProviderError, Result};
pub use listing_cache::{RemoteListingCache, RemoteTree};
pub use signed_url::{SignedUrlBroker, SignedUrlKind};
pub use ttl_cache::{CacheEntry, TtlCache};
pub use uploader::{RemoteUploader, UploadOutcome};
