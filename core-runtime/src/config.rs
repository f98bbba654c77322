//! # Engine Configuration
//!
//! [`SyncEngineConfig`] gathers every knob the sync engine reads: storage
//! roots, worker concurrency, external tool settings, cache lifetimes and the
//! optional remote storage endpoint.
//!
//! Configuration is assembled with [`SyncEngineConfig::builder`] or loaded
//! from the environment with [`SyncEngineConfig::from_env`]. Both paths end in
//! [`SyncEngineConfig::validate`], so an invalid configuration fails at start-up
//! with an actionable message instead of during the first scan.
//!
//! ```ignore
//! use core_runtime::config::{RemoteConfig, SyncEngineConfig};
//!
//! let config = SyncEngineConfig::builder()
//!     .videos_dir("/srv/media/videos")
//!     .images_dir("/srv/media/images")
//!     .concurrency(4)
//!     .remote(
//!         RemoteConfig::new("https://storage.example.com", "token")
//!             .with_upload_path("/media")
//!             .with_public_url("https://cdn.example.com"),
//!     )
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Extensions treated as videos when no override is configured.
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov"];

const MAX_CONCURRENCY: usize = 64;

/// External media tool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub ffprobe_path: String,
    pub ffmpeg_path: String,
    pub probe_timeout: Duration,
    pub thumbnail_timeout: Duration,
    /// Total thumbnail attempts, including the first.
    pub thumbnail_attempts: u32,
    pub thumbnail_retry_delay: Duration,
    /// Preferred position of the thumbnail frame.
    pub thumbnail_offset: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: "ffprobe".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            probe_timeout: Duration::from_secs(30),
            thumbnail_timeout: Duration::from_secs(60),
            thumbnail_attempts: 3,
            thumbnail_retry_delay: Duration::from_secs(1),
            thumbnail_offset: Duration::from_secs(1),
        }
    }
}

/// Lifetimes of the process-wide caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub listing_ttl: Duration,
    pub signed_url_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            listing_ttl: Duration::from_secs(60),
            signed_url_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Remote object storage endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// API base URL, e.g. `https://storage.example.com`.
    pub base_url: String,
    /// Value sent verbatim in the `Authorization` header.
    pub token: String,
    /// Domain used when building signed URLs; falls back to `base_url`.
    pub public_url: Option<String>,
    /// Root that uploads go to and that cloud storage keys are relative to.
    pub upload_path: String,
    /// Extra remote roots scanned in addition to `upload_path`.
    pub scan_paths: Vec<String>,
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            public_url: None,
            upload_path: "/".to_string(),
            scan_paths: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = Some(public_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_upload_path(mut self, upload_path: impl Into<String>) -> Self {
        self.upload_path = normalize_remote_root(&upload_path.into());
        self
    }

    pub fn with_scan_paths<I, S>(mut self, scan_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scan_paths = scan_paths
            .into_iter()
            .map(|p| normalize_remote_root(&p.into()))
            .collect();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Domain that signed URLs are built on.
    pub fn public_domain(&self) -> &str {
        self.public_url.as_deref().unwrap_or(&self.base_url)
    }

    /// Upload root followed by every distinct scan path.
    pub fn scan_roots(&self) -> Vec<String> {
        let mut roots = vec![self.upload_path.clone()];
        for path in &self.scan_paths {
            if !roots.contains(path) {
                roots.push(path.clone());
            }
        }
        roots
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            Error::Config(format!("Remote base URL '{}' is invalid: {}", self.base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Remote base URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        if let Some(public_url) = &self.public_url {
            url::Url::parse(public_url).map_err(|e| {
                Error::Config(format!("Remote public URL '{}' is invalid: {}", public_url, e))
            })?;
        }

        if self.token.trim().is_empty() {
            return Err(Error::Config(
                "Remote token cannot be empty. Set MEDIASYNC_REMOTE_TOKEN.".to_string(),
            ));
        }

        for path in std::iter::once(&self.upload_path).chain(self.scan_paths.iter()) {
            if !path.starts_with('/') || path.split('/').any(|segment| segment == "..") {
                return Err(Error::Config(format!(
                    "Remote path '{}' must be absolute and must not contain '..'",
                    path
                )));
            }
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Remote request timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("public_url", &self.public_url)
            .field("upload_path", &self.upload_path)
            .field("scan_paths", &self.scan_paths)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn normalize_remote_root(path: &str) -> String {
    let trimmed = path.trim().replace('\\', "/");
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEngineConfig {
    /// Local video root; local storage keys are relative to it.
    pub videos_dir: PathBuf,
    /// Local thumbnail root.
    pub images_dir: PathBuf,
    /// Scratch space for thumbnails generated before upload.
    pub temp_dir: PathBuf,
    /// SQLite catalog file used by the bundled catalog implementation.
    pub database_path: PathBuf,
    /// Worker lanes per scan.
    pub concurrency: usize,
    /// Maximum directory depth below a scan root.
    pub max_scan_depth: usize,
    /// Lower-cased extensions without the leading dot.
    pub video_extensions: Vec<String>,
    pub tools: ToolConfig,
    pub cache: CacheConfig,
    pub remote: Option<RemoteConfig>,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            videos_dir: PathBuf::from("./data/videos"),
            images_dir: PathBuf::from("./data/images"),
            temp_dir: std::env::temp_dir(),
            database_path: PathBuf::from("./data/catalog.db"),
            concurrency: 3,
            max_scan_depth: 32,
            video_extensions: DEFAULT_VIDEO_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            tools: ToolConfig::default(),
            cache: CacheConfig::default(),
            remote: None,
        }
    }
}

impl SyncEngineConfig {
    pub fn builder() -> SyncEngineConfigBuilder {
        SyncEngineConfigBuilder::default()
    }

    /// Loads configuration from `MEDIASYNC_*` environment variables.
    ///
    /// A `.env` file in the working directory is read first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(dir) = var("MEDIASYNC_VIDEOS_DIR") {
            builder = builder.videos_dir(dir);
        }
        if let Some(dir) = var("MEDIASYNC_IMAGES_DIR") {
            builder = builder.images_dir(dir);
        }
        if let Some(dir) = var("MEDIASYNC_TEMP_DIR") {
            builder = builder.temp_dir(dir);
        }
        if let Some(path) = var("MEDIASYNC_DATABASE_PATH") {
            builder = builder.database_path(path);
        }
        if let Some(value) = var("MEDIASYNC_CONCURRENCY") {
            builder = builder.concurrency(parse_number("MEDIASYNC_CONCURRENCY", &value)?);
        }
        if let Some(value) = var("MEDIASYNC_MAX_SCAN_DEPTH") {
            builder = builder.max_scan_depth(parse_number("MEDIASYNC_MAX_SCAN_DEPTH", &value)?);
        }

        let mut tools = ToolConfig::default();
        if let Some(path) = var("MEDIASYNC_FFPROBE") {
            tools.ffprobe_path = path;
        }
        if let Some(path) = var("MEDIASYNC_FFMPEG") {
            tools.ffmpeg_path = path;
        }
        if let Some(value) = var("MEDIASYNC_PROBE_TIMEOUT_SECS") {
            tools.probe_timeout = Duration::from_secs(parse_number(
                "MEDIASYNC_PROBE_TIMEOUT_SECS",
                &value,
            )?);
        }
        if let Some(value) = var("MEDIASYNC_THUMBNAIL_TIMEOUT_SECS") {
            tools.thumbnail_timeout = Duration::from_secs(parse_number(
                "MEDIASYNC_THUMBNAIL_TIMEOUT_SECS",
                &value,
            )?);
        }
        builder = builder.tools(tools);

        match (var("MEDIASYNC_REMOTE_URL"), var("MEDIASYNC_REMOTE_TOKEN")) {
            (Some(base_url), Some(token)) => {
                let mut remote = RemoteConfig::new(base_url, token);
                if let Some(public_url) = var("MEDIASYNC_REMOTE_PUBLIC_URL") {
                    remote = remote.with_public_url(public_url);
                }
                if let Some(upload_path) = var("MEDIASYNC_REMOTE_UPLOAD_PATH") {
                    remote = remote.with_upload_path(upload_path);
                }
                if let Some(scan_paths) = var("MEDIASYNC_REMOTE_SCAN_PATHS") {
                    remote = remote.with_scan_paths(
                        scan_paths
                            .split(',')
                            .map(str::trim)
                            .filter(|p| !p.is_empty())
                            .map(str::to_string),
                    );
                }
                builder = builder.remote(remote);
            }
            (Some(_), None) => {
                return Err(Error::Config(
                    "MEDIASYNC_REMOTE_URL is set but MEDIASYNC_REMOTE_TOKEN is missing".to_string(),
                ));
            }
            _ => {}
        }

        builder.build()
    }

    pub fn validate(&self) -> Result<()> {
        if self.videos_dir.as_os_str().is_empty() {
            return Err(Error::Config("Videos directory cannot be empty".to_string()));
        }

        if self.images_dir.as_os_str().is_empty() {
            return Err(Error::Config("Images directory cannot be empty".to_string()));
        }

        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(Error::Config(format!(
                "Concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }

        if self.max_scan_depth == 0 {
            return Err(Error::Config(
                "Maximum scan depth must be at least 1".to_string(),
            ));
        }

        if self.video_extensions.is_empty() {
            return Err(Error::Config(
                "At least one video extension must be configured".to_string(),
            ));
        }

        if self.tools.thumbnail_attempts == 0 {
            return Err(Error::Config(
                "Thumbnail attempts must be at least 1".to_string(),
            ));
        }

        if self.tools.probe_timeout.is_zero() || self.tools.thumbnail_timeout.is_zero() {
            return Err(Error::Config(
                "Tool timeouts must be greater than zero".to_string(),
            ));
        }

        if self.cache.listing_ttl.is_zero() || self.cache.signed_url_ttl.is_zero() {
            return Err(Error::Config(
                "Cache lifetimes must be greater than zero".to_string(),
            ));
        }

        if let Some(remote) = &self.remote {
            remote.validate()?;
        }

        Ok(())
    }

    /// Whether `name` carries one of the configured video extensions.
    pub fn is_video_file(&self, name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.video_extensions.iter().any(|allowed| *allowed == ext)
            }
            _ => false,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, value)))
}

/// Builder for [`SyncEngineConfig`].
#[derive(Debug, Default)]
pub struct SyncEngineConfigBuilder {
    config: SyncEngineConfig,
}

impl SyncEngineConfigBuilder {
    pub fn videos_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.videos_dir = dir.into();
        self
    }

    pub fn images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.images_dir = dir.into();
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    pub fn concurrency(mut self, lanes: usize) -> Self {
        self.config.concurrency = lanes;
        self
    }

    pub fn max_scan_depth(mut self, depth: usize) -> Self {
        self.config.max_scan_depth = depth;
        self
    }

    pub fn video_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.video_extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn tools(mut self, tools: ToolConfig) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    pub fn remote(mut self, remote: RemoteConfig) -> Self {
        self.config.remote = Some(remote);
        self
    }

    pub fn build(self) -> Result<SyncEngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncEngineConfig::builder().build().unwrap();

        assert_eq!(config.concurrency, 3);
        assert_eq!(config.max_scan_depth, 32);
        assert_eq!(config.cache.listing_ttl, Duration::from_secs(60));
        assert_eq!(config.cache.signed_url_ttl, Duration::from_secs(300));
        assert_eq!(config.tools.thumbnail_attempts, 3);
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = SyncEngineConfig::builder().concurrency(0).build().unwrap_err();
        assert!(err.to_string().contains("Concurrency"));
    }

    #[test]
    fn test_video_extension_matching() {
        let config = SyncEngineConfig::builder()
            .video_extensions([".MP4", "mkv"])
            .build()
            .unwrap();

        assert!(config.is_video_file("Trip.Mp4"));
        assert!(config.is_video_file("clip.mkv"));
        assert!(!config.is_video_file("notes.txt"));
        assert!(!config.is_video_file(".mp4"));
        assert!(!config.is_video_file("mp4"));
    }

    #[test]
    fn test_remote_paths_are_normalized() {
        let remote = RemoteConfig::new("https://storage.example.com/", "tkn")
            .with_upload_path("media/")
            .with_scan_paths(["/archive", "/media"]);

        assert_eq!(remote.base_url, "https://storage.example.com");
        assert_eq!(remote.upload_path, "/media");
        assert_eq!(remote.scan_roots(), vec!["/media", "/archive"]);
        assert_eq!(remote.public_domain(), "https://storage.example.com");
    }

    #[test]
    fn test_remote_validation() {
        let bad_scheme = RemoteConfig::new("ftp://storage.example.com", "tkn");
        assert!(bad_scheme.validate().is_err());

        let empty_token = RemoteConfig::new("https://storage.example.com", " ");
        assert!(empty_token.validate().is_err());

        let traversal =
            RemoteConfig::new("https://storage.example.com", "tkn").with_scan_paths(["/a/../b"]);
        assert!(traversal.validate().is_err());
    }

    #[test]
    fn test_remote_debug_redacts_token() {
        let remote = RemoteConfig::new("https://storage.example.com", "super-secret");
        let debug = format!("{:?}", remote);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_from_lookup() {
        let config = SyncEngineConfig::from_lookup(lookup(&[
            ("MEDIASYNC_VIDEOS_DIR", "/srv/videos"),
            ("MEDIASYNC_CONCURRENCY", "5"),
            ("MEDIASYNC_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
            ("MEDIASYNC_REMOTE_URL", "https://storage.example.com"),
            ("MEDIASYNC_REMOTE_TOKEN", "tkn"),
            ("MEDIASYNC_REMOTE_UPLOAD_PATH", "/media"),
            ("MEDIASYNC_REMOTE_SCAN_PATHS", "/archive, /shared ,"),
        ]))
        .unwrap();

        assert_eq!(config.videos_dir, PathBuf::from("/srv/videos"));
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.tools.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        let remote = config.remote.unwrap();
        assert_eq!(remote.upload_path, "/media");
        assert_eq!(remote.scan_paths, vec!["/archive", "/shared"]);
    }

    #[test]
    fn test_from_lookup_rejects_bad_numbers_and_missing_token() {
        assert!(SyncEngineConfig::from_lookup(lookup(&[("MEDIASYNC_CONCURRENCY", "many")])).is_err());
        assert!(SyncEngineConfig::from_lookup(lookup(&[(
            "MEDIASYNC_REMOTE_URL",
            "https://storage.example.com"
        )]))
        .is_err());
    }
}
