//! Signed access URLs
//!
//! Resolves a video or thumbnail identifier to a time-limited URL on the
//! public domain. Results are cached per `identifier:kind` and concurrent
//! lookups for the same key share one resolution.
//!
//! ## Resolution
//!
//! 1. The identifier becomes a remote path: absolute identifiers are used as
//!    is, anything else is relative to the upload root.
//! 2. The parent directory is listed and the file matched by name. A bare
//!    filename that is not found there is searched for by basename below the
//!    upload root.
//! 3. With an access token: `{domain}/d{path}?sign={token}`.
//! 4. A thumbnail without a token falls back to the provider preview of the
//!    video with the same stem, rewritten to 1280x720 on the public domain.

use bridge_traits::storage::FileEntry;
use bridge_traits::time::Clock;
use core_async::SingleFlight;
use core_runtime::config::RemoteConfig;
use core_runtime::logging::redact_signed_url;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{ProviderError, Result};
use crate::listing_cache::RemoteListingCache;
use crate::remote_path;
use crate::ttl_cache::TtlCache;

const THUMB_WIDTH: &str = "1280";
const THUMB_HEIGHT: &str = "720";

/// What a signed URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignedUrlKind {
    Video,
    Thumbnail,
}

impl SignedUrlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignedUrlKind::Video => "video",
            SignedUrlKind::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for SignedUrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct SignedUrlBroker {
    resolver: Resolver,
    cache: Arc<TtlCache<String>>,
    flights: SingleFlight<String, Option<String>>,
}

impl SignedUrlBroker {
    pub fn new(
        listings: Arc<RemoteListingCache>,
        remote: &RemoteConfig,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let public_url = remote
            .public_url
            .as_deref()
            .and_then(|public| Url::parse(public).ok());

        Self {
            resolver: Resolver {
                listings,
                domain: remote.public_domain().trim_end_matches('/').to_string(),
                public_url,
                upload_root: remote_path::normalize_dir(&remote.upload_path),
            },
            cache: Arc::new(TtlCache::new(ttl, clock)),
            flights: SingleFlight::new(),
        }
    }

    /// Signed URL for `identifier`, or `None` when it cannot be resolved.
    #[instrument(skip(self))]
    pub async fn get_signed_url(&self, identifier: &str, kind: SignedUrlKind) -> Option<String> {
        let key = cache_key(identifier, kind);

        if let Some(url) = self.cache.get(&key) {
            debug!("Signed URL cache hit");
            return Some(url);
        }

        let resolver = self.resolver.clone();
        let cache = Arc::clone(&self.cache);
        let identifier = identifier.to_string();

        self.flights
            .run(key.clone(), move || async move {
                match resolver.resolve(&identifier, kind).await {
                    Ok(url) => {
                        debug!(url = %redact_signed_url(&url), "Signed URL resolved");
                        cache.insert(key, url.clone());
                        Some(url)
                    }
                    Err(e) => {
                        warn!(identifier = %identifier, kind = %kind, error = %e, "Failed to resolve signed URL");
                        None
                    }
                }
            })
            .await
    }

    /// Drops expired URLs, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Drops both kinds cached for one identifier, or everything.
    pub fn invalidate(&self, identifier: Option<&str>) {
        match identifier {
            Some(identifier) => {
                for kind in [SignedUrlKind::Video, SignedUrlKind::Thumbnail] {
                    self.cache.remove(&cache_key(identifier, kind));
                }
            }
            None => self.cache.clear(),
        }
    }

    pub fn is_resolving(&self, identifier: &str, kind: SignedUrlKind) -> bool {
        self.flights.is_in_flight(&cache_key(identifier, kind))
    }
}

fn cache_key(identifier: &str, kind: SignedUrlKind) -> String {
    format!("{}:{}", identifier, kind)
}

#[derive(Clone)]
struct Resolver {
    listings: Arc<RemoteListingCache>,
    domain: String,
    public_url: Option<Url>,
    upload_root: String,
}

impl Resolver {
    async fn resolve(&self, identifier: &str, kind: SignedUrlKind) -> Result<String> {
        let remote = self.remote_path(identifier);
        let (parent, name) = remote_path::split(&remote);

        let siblings = match self.listings.list(&parent).await {
            Ok(listing) => listing.as_ref().clone(),
            Err(e) if is_bare_filename(identifier) => {
                debug!(error = %e, "Parent listing failed, searching upload tree");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut found = find_file(&siblings, &name).cloned();
        let mut search_space = siblings;

        if found.is_none() && is_bare_filename(identifier) {
            let tree = self.listings.list_recursive(&self.upload_root).await;
            found = find_file(&tree.entries, &name).cloned();
            if let Some(entry) = &found {
                search_space = tree
                    .entries
                    .iter()
                    .filter(|candidate| candidate.parent_path() == entry.parent_path())
                    .cloned()
                    .collect();
            }
        }

        if let Some(entry) = &found {
            if let Some(token) = &entry.access_token {
                return Ok(self.signed(&entry.path, token));
            }
            if kind == SignedUrlKind::Video {
                return Ok(self.unsigned(&entry.path));
            }
        }

        if kind == SignedUrlKind::Thumbnail {
            if let Some(thumb) = self.thumbnail_fallback(&search_space, &name) {
                return Ok(thumb);
            }
        }

        Err(ProviderError::NotFound(remote))
    }

    fn remote_path(&self, identifier: &str) -> String {
        if identifier.starts_with('/') {
            remote_path::normalize_dir(identifier)
        } else {
            remote_path::join(&self.upload_root, identifier)
        }
    }

    fn signed(&self, path: &str, token: &str) -> String {
        format!("{}?sign={}", self.unsigned(path), token)
    }

    fn unsigned(&self, path: &str) -> String {
        format!("{}/d{}", self.domain, remote_path::encode_segments(path))
    }

    /// Provider preview of the sibling that shares the thumbnail's stem.
    fn thumbnail_fallback(&self, siblings: &[FileEntry], thumbnail_name: &str) -> Option<String> {
        let stem = match thumbnail_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => thumbnail_name,
        };

        siblings
            .iter()
            .filter(|entry| !entry.is_directory && entry.name != thumbnail_name)
            .filter(|entry| entry.stem() == stem)
            .find_map(|entry| entry.thumb.as_deref())
            .and_then(|thumb| high_resolution_thumb(thumb, self.public_url.as_ref()))
    }
}

fn is_bare_filename(identifier: &str) -> bool {
    !identifier.contains('/')
}

fn find_file<'a>(entries: &'a [FileEntry], name: &str) -> Option<&'a FileEntry> {
    entries
        .iter()
        .find(|entry| !entry.is_directory && entry.name == name)
}

/// Rewrites size parameters to 1280x720 and moves the URL onto the public
/// domain.
fn high_resolution_thumb(thumb: &str, public_url: Option<&Url>) -> Option<String> {
    let mut url = Url::parse(thumb).ok()?;

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = match key.as_ref() {
                "width" | "w" => THUMB_WIDTH.to_string(),
                "height" | "h" => THUMB_HEIGHT.to_string(),
                "size" => format!("{}x{}", THUMB_WIDTH, THUMB_HEIGHT),
                _ => value.into_owned(),
            };
            (key.into_owned(), value)
        })
        .collect();

    if !pairs.is_empty() {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    if let Some(public) = public_url {
        if url.set_scheme(public.scheme()).is_err()
            || url.set_host(public.host_str()).is_err()
            || url.set_port(public.port()).is_err()
        {
            debug!("Keeping provider host for thumbnail");
        }
    }

    Some(url.to_string())
}
