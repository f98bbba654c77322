//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop and server hosts
//! (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest`, with retry and streamed file uploads
//! - `ProcessRunner` using `tokio::process`, with kill-on-timeout
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioProcessRunner};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let runner = TokioProcessRunner::new();
//! ```

mod http;
mod process;

pub use http::ReqwestHttpClient;
pub use process::TokioProcessRunner;
