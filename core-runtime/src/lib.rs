//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the sync engine crates:
//! - Engine configuration (builder and environment loading)
//! - Logging and tracing initialisation
//! - Event bus for scan and catalog events

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CacheConfig, RemoteConfig, SyncEngineConfig, ToolConfig};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, LibraryEvent, ScanEvent, ScanKind};
