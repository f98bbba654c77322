//! Workspace placeholder crate.
//!
//! Re-exports the `core-service` façade so hosts can depend on
//! `mediasync-workspace` and pick features without wiring each crate.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
