//! # Catalog Module
//!
//! The video/collection record store the sync engine reconciles against.
//!
//! ## Overview
//!
//! - [`Catalog`] is the collaborator interface the engine calls
//! - [`SqliteCatalog`] implements it on SQLite through `sqlx`
//! - [`CatalogSnapshot`] is the immutable path → {id, size} view taken at scan start

pub mod catalog;
pub mod db;
pub mod error;
pub mod models;

pub use catalog::{Catalog, SqliteCatalog};
pub use error::{LibraryError, Result};
pub use models::{
    new_record_id, title_from_filename, CatalogEntry, CatalogSnapshot, CollectionRecord,
    VideoRecord, VideoSource,
};
