//! Video Metadata Extraction
//!
//! Runs the external probe and frame-grab tools through a
//! [`ProcessRunner`](bridge_traits::process::ProcessRunner).
//!
//! ## Overview
//!
//! - Duration probing is best effort: any failure yields `None` and is logged
//! - Thumbnail generation is retried a bounded number of times with a fixed
//!   delay, removing partial output after every failed attempt
//! - Sources are local paths or signed URLs; both reach the tool as a single
//!   argument, never through a shell
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::extractor::MetadataExtractor;
//!
//! let extractor = MetadataExtractor::new(runner, config.tools.clone());
//! let duration = extractor.probe_duration("/srv/videos/movie.mp4").await;
//! let at = extractor.thumbnail_offset(duration);
//! extractor
//!     .generate_thumbnail("/srv/videos/movie.mp4", at, Path::new("/srv/images/movie.jpg"))
//!     .await?;
//! ```

use bridge_traits::error::BridgeError;
use bridge_traits::process::ProcessRunner;
use core_async::fs;
use core_runtime::config::ToolConfig;
use core_runtime::logging::redact_signed_url;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{MetadataError, Result};

const STDERR_TAIL: usize = 300;

/// Probes durations and grabs thumbnail frames.
#[derive(Clone)]
pub struct MetadataExtractor {
    runner: Arc<dyn ProcessRunner>,
    tools: ToolConfig,
}

impl MetadataExtractor {
    pub fn new(runner: Arc<dyn ProcessRunner>, tools: ToolConfig) -> Self {
        Self { runner, tools }
    }

    pub fn tools(&self) -> &ToolConfig {
        &self.tools
    }

    /// Duration of `source` in whole seconds (rounded).
    ///
    /// Returns `None` when the probe fails, times out, or prints something
    /// that is not a non-negative number. Never retried.
    #[instrument(skip(self, source), fields(source = %redact_signed_url(source)))]
    pub async fn probe_duration(&self, source: &str) -> Option<u64> {
        let args = probe_args(source);

        let output = match self
            .runner
            .run(&self.tools.ffprobe_path, &args, self.tools.probe_timeout)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Duration probe failed");
                return None;
            }
        };

        if !output.success() {
            warn!(
                status = ?output.status_code,
                stderr = %output.stderr_tail(STDERR_TAIL),
                "Duration probe exited with failure"
            );
            return None;
        }

        let duration = parse_duration(&output.stdout);
        if duration.is_none() {
            debug!(stdout = %output.stdout.trim(), "Probe output has no usable duration");
        }
        duration
    }

    /// Writes one JPEG frame of `source` taken at `at` to `dest`.
    ///
    /// # Errors
    ///
    /// - `MetadataError::FileNotFound` when a local `source` does not exist
    ///   (not retried)
    /// - `MetadataError::ExtractionTimeout` when the final attempt timed out
    /// - `MetadataError::ExtractionFailed` when every attempt failed otherwise
    #[instrument(skip(self, source, dest), fields(source = %redact_signed_url(source), dest = %dest.display()))]
    pub async fn generate_thumbnail(&self, source: &str, at: Duration, dest: &Path) -> Result<()> {
        if !is_remote(source) && fs::metadata(source).await.is_err() {
            return Err(MetadataError::FileNotFound(source.to_string()));
        }

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let args = thumbnail_args(source, at, dest);
        let attempts = self.tools.thumbnail_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.attempt_thumbnail(&args, dest).await {
                Ok(()) => {
                    debug!(attempt, "Thumbnail generated");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, max_attempts = attempts, error = %e, "Thumbnail attempt failed");
                    remove_partial(dest).await;
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                core_async::time::sleep(self.tools.thumbnail_retry_delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            MetadataError::ExtractionFailed("Thumbnail generation did not run".to_string())
        }))
    }

    async fn attempt_thumbnail(&self, args: &[String], dest: &Path) -> Result<()> {
        let output = self
            .runner
            .run(&self.tools.ffmpeg_path, args, self.tools.thumbnail_timeout)
            .await
            .map_err(|e| match e {
                BridgeError::Timeout(message) => MetadataError::ExtractionTimeout(message),
                other => MetadataError::Bridge(other),
            })?;

        if !output.success() {
            return Err(MetadataError::ExtractionFailed(format!(
                "{} exited with {:?}: {}",
                self.tools.ffmpeg_path,
                output.status_code,
                output.stderr_tail(STDERR_TAIL)
            )));
        }

        match fs::metadata(dest).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(MetadataError::ExtractionFailed(
                "Thumbnail output is empty".to_string(),
            )),
            Err(_) => Err(MetadataError::ExtractionFailed(
                "Thumbnail output was not written".to_string(),
            )),
        }
    }

    /// Position of the thumbnail frame for a video of `duration` seconds.
    ///
    /// The configured offset, pulled back to the middle of short videos.
    pub fn thumbnail_offset(&self, duration: Option<u64>) -> Duration {
        let preferred = self.tools.thumbnail_offset;
        match duration {
            Some(seconds) => {
                let middle = Duration::from_secs(seconds) / 2;
                preferred.min(middle)
            }
            None => preferred,
        }
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn probe_args(source: &str) -> Vec<String> {
    [
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
        source,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn thumbnail_args(source: &str, at: Duration, dest: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-ss".to_string(),
        format_timestamp(at),
        "-i".to_string(),
        source.to_string(),
        "-vframes".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "2".to_string(),
        dest.to_string_lossy().into_owned(),
    ]
}

/// `HH:MM:SS` for the seek argument.
fn format_timestamp(at: Duration) -> String {
    let total = at.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn parse_duration(stdout: &str) -> Option<u64> {
    let seconds: f64 = stdout.lines().next()?.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(seconds.round() as u64)
    } else {
        None
    }
}

async fn remove_partial(dest: &Path) {
    match fs::remove_file(dest).await {
        Ok(()) => debug!(path = %dest.display(), "Removed partial thumbnail"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dest.display(), error = %e, "Failed to remove partial thumbnail"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("12.5\n"), Some(13));
        assert_eq!(parse_duration("12.4"), Some(12));
        assert_eq!(parse_duration("0.000000"), Some(0));
        assert_eq!(parse_duration("N/A"), None);
        assert_eq!(parse_duration("-3"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(Duration::from_secs(1)), "00:00:01");
        assert_eq!(format_timestamp(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn test_thumbnail_args_keep_source_as_one_argument() {
        let args = thumbnail_args(
            "/videos/My Movie; rm -rf.mp4",
            Duration::from_secs(1),
            Path::new("/images/out.jpg"),
        );

        assert_eq!(args[4], "/videos/My Movie; rm -rf.mp4");
        assert_eq!(args.last().map(String::as_str), Some("/images/out.jpg"));
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://cdn.example.com/d/a.mp4?sign=x"));
        assert!(!is_remote("/srv/videos/a.mp4"));
    }
}
