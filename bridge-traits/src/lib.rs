//! # Host Bridge Traits
//!
//! Capability traits the sync engine needs from its host, plus the value types
//! that cross those boundaries.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry and streamed file bodies
//! - [`ProcessRunner`](process::ProcessRunner) - Spawn external tools with an argument list and a timeout
//! - [`RemoteStorage`](storage::RemoteStorage) - List and upload against a remote object store
//! - [`Clock`](time::Clock) - Time source for deterministic cache expiry
//!
//! Desktop adapters live in `bridge-desktop`; tests provide their own fakes.
//!
//! ## Error Handling
//!
//! Every trait returns [`BridgeError`](error::BridgeError). Adapters convert
//! their library errors into it and keep the message actionable (URL, program
//! name, path).
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so a single adapter can be shared by `Arc`
//! across the worker lanes of a scan.

pub mod error;
pub mod http;
pub mod process;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpBody, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use process::{ProcessOutput, ProcessRunner};
pub use storage::{FileEntry, RemoteStorage};
pub use time::{Clock, ManualClock, SystemClock};
