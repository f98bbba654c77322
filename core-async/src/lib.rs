//! Async building blocks shared by every crate in the media sync workspace.
//!
//! Downstream crates depend on this crate instead of reaching for Tokio
//! directly, which keeps the runtime choice in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and cooperative yielding
//! - `time`: Sleep, timeouts and instants
//! - `sync`: Async locks, semaphores and channels
//! - `fs`: Async filesystem access
//! - `singleflight`: Keyed coalescing of concurrent identical operations
//!
//! # Examples
//!
//! ```rust
//! use core_async::singleflight::SingleFlight;
//!
//! async fn example(flights: &SingleFlight<String, u64>) -> u64 {
//!     flights
//!         .run("listing:/media".to_string(), || async { 42 })
//!         .await
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

// Lets the macros' `core_async::` paths resolve inside this crate's own tests.
extern crate self as core_async;

pub mod fs;
pub mod runtime;
pub mod singleflight;
pub mod sync;
pub mod task;
pub mod time;

pub use singleflight::SingleFlight;
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
