//! Catalog domain models
//!
//! Records stored by the catalog plus the read-only [`CatalogSnapshot`] the
//! reconciler diffs against.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Backend a video was discovered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum VideoSource {
    Local,
    Mount,
    Cloud,
}

impl VideoSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoSource::Local => "local",
            VideoSource::Mount => "mount",
            VideoSource::Cloud => "cloud",
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(VideoSource::Local),
            "mount" => Ok(VideoSource::Mount),
            "cloud" => Ok(VideoSource::Cloud),
            other => Err(format!("Unknown video source: {}", other)),
        }
    }
}

/// Generates a fresh record identifier.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Records
// =============================================================================

/// One cataloged video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Stable across updates of the same storage key.
    pub id: String,
    pub title: String,
    pub video_filename: String,
    /// Storage key (`/videos/...`, `mount:...`, `cloud:...`).
    pub video_path: String,
    pub thumbnail_filename: Option<String>,
    pub thumbnail_path: Option<String>,
    /// Seconds, when the probe succeeded.
    pub duration: Option<i64>,
    /// Bytes.
    pub file_size: i64,
    pub source: VideoSource,
    /// Unix seconds of the first insertion.
    pub added_at: i64,
}

impl VideoRecord {
    pub fn new(
        id: impl Into<String>,
        video_path: impl Into<String>,
        video_filename: impl Into<String>,
        source: VideoSource,
    ) -> Self {
        let video_filename = video_filename.into();
        Self {
            id: id.into(),
            title: title_from_filename(&video_filename),
            video_filename,
            video_path: video_path.into(),
            thumbnail_filename: None,
            thumbnail_path: None,
            duration: None,
            file_size: 0,
            source,
            added_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Video id cannot be empty".to_string());
        }

        if self.video_path.trim().is_empty() {
            return Err("Video path cannot be empty".to_string());
        }

        if self.file_size < 0 {
            return Err("File size cannot be negative".to_string());
        }

        if let Some(duration) = self.duration {
            if duration < 0 {
                return Err("Duration cannot be negative".to_string());
            }
        }

        Ok(())
    }
}

/// Title shown for a file: the name without its extension.
pub fn title_from_filename(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => filename.to_string(),
    }
}

/// Named group of videos, auto-created from folder names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    pub id: String,
    /// Lookup key, unique.
    pub name: String,
    pub title: String,
    pub created_at: i64,
}

impl CollectionRecord {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: new_record_id(),
            title: name.clone(),
            name,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Identity and size of a cataloged video, keyed by storage path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CatalogEntry {
    pub id: String,
    pub file_size: i64,
}

/// Immutable view of the catalog taken at scan start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    entries: HashMap<String, CatalogEntry>,
}

impl CatalogSnapshot {
    pub fn new(entries: HashMap<String, CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn get(&self, storage_key: &str) -> Option<&CatalogEntry> {
        self.entries.get(storage_key)
    }

    pub fn contains(&self, storage_key: &str) -> bool {
        self.entries.contains_key(storage_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CatalogEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Entries whose storage key satisfies `predicate`.
    pub fn matching<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = (&'a str, &'a CatalogEntry)>
    where
        P: Fn(&str) -> bool + 'a,
    {
        self.iter().filter(move |(key, _)| predicate(key))
    }
}

impl From<HashMap<String, CatalogEntry>> for CatalogSnapshot {
    fn from(entries: HashMap<String, CatalogEntry>) -> Self {
        Self::new(entries)
    }
}
