use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::storage::{FileEntry, RemoteStorage};
use bridge_traits::time::{Clock, ManualClock};
use core_runtime::config::RemoteConfig;
use provider_alist::{
    ProviderError, RemoteListingCache, RemoteUploader, SignedUrlBroker, SignedUrlKind,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory remote store with per-directory call counters.
#[derive(Default)]
struct FakeStorage {
    dirs: Mutex<HashMap<String, Vec<FileEntry>>>,
    failing: Mutex<Vec<String>>,
    list_calls: Mutex<HashMap<String, usize>>,
    uploads: Mutex<Vec<String>>,
    upload_failure: Mutex<Option<(i64, String)>>,
    latency: Duration,
}

impl FakeStorage {
    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn put_dir(&self, dir: &str, entries: Vec<FileEntry>) {
        self.dirs.lock().unwrap().insert(dir.to_string(), entries);
    }

    fn fail_dir(&self, dir: &str) {
        self.failing.lock().unwrap().push(dir.to_string());
    }

    fn list_calls(&self, dir: &str) -> usize {
        self.list_calls.lock().unwrap().get(dir).copied().unwrap_or(0)
    }

    fn total_list_calls(&self) -> usize {
        self.list_calls.lock().unwrap().values().sum()
    }

    fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteStorage for FakeStorage {
    async fn list_directory(&self, path: &str) -> BridgeResult<Vec<FileEntry>> {
        *self
            .list_calls
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default() += 1;

        if !self.latency.is_zero() {
            core_async::time::sleep(self.latency).await;
        }

        if self.failing.lock().unwrap().iter().any(|d| d == path) {
            return Err(BridgeError::Network(format!("connection reset listing {}", path)));
        }

        self.dirs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BridgeError::Rejected {
                code: 500,
                message: "object not found".to_string(),
            })
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> BridgeResult<()> {
        core_async::fs::metadata(local_path).await?;
        if let Some((code, message)) = self.upload_failure.lock().unwrap().clone() {
            return Err(BridgeError::Rejected { code, message });
        }
        self.uploads.lock().unwrap().push(remote_path.to_string());
        Ok(())
    }
}

fn signed(path: &str, size: u64, sign: &str) -> FileEntry {
    FileEntry::file(path, size).with_access_token(sign)
}

fn listing_cache(storage: Arc<FakeStorage>, clock: Arc<ManualClock>) -> Arc<RemoteListingCache> {
    Arc::new(RemoteListingCache::new(
        storage,
        Duration::from_secs(60),
        clock as Arc<dyn Clock>,
    ))
}

fn broker(listings: Arc<RemoteListingCache>, clock: Arc<ManualClock>) -> SignedUrlBroker {
    let remote = RemoteConfig::new("http://10.0.0.5:5244", "secret")
        .with_public_url("https://media.example.com")
        .with_upload_path("/media");
    SignedUrlBroker::new(listings, &remote, Duration::from_secs(300), clock)
}

#[core_async::test(multi_thread)]
async fn test_concurrent_listing_misses_share_one_call() {
    let storage = Arc::new(FakeStorage::with_latency(Duration::from_millis(50)));
    storage.put_dir("/media", vec![signed("/media/a.mp4", 10, "s1")]);
    let listings = listing_cache(storage.clone(), Arc::new(ManualClock::default()));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let listings = Arc::clone(&listings);
        handles.push(core_async::spawn(async move { listings.list("/media").await }));
    }

    for handle in handles {
        let listing = handle.await.unwrap().unwrap();
        assert_eq!(listing.len(), 1);
    }
    assert_eq!(storage.list_calls("/media"), 1);
}

#[core_async::test]
async fn test_listing_expires_after_ttl_and_invalidate() {
    let storage = Arc::new(FakeStorage::default());
    storage.put_dir("/media", vec![]);
    let clock = Arc::new(ManualClock::default());
    let listings = listing_cache(storage.clone(), clock.clone());

    listings.list("/media").await.unwrap();
    listings.list("/media/").await.unwrap();
    assert_eq!(storage.list_calls("/media"), 1);

    clock.advance(Duration::from_secs(61));
    listings.list("/media").await.unwrap();
    assert_eq!(storage.list_calls("/media"), 2);

    listings.invalidate(Some("/media"));
    listings.list("/media").await.unwrap();
    assert_eq!(storage.list_calls("/media"), 3);

    listings.invalidate(None);
    listings.list("/media").await.unwrap();
    assert_eq!(storage.list_calls("/media"), 4);
}

#[core_async::test]
async fn test_expired_entries_are_purged() {
    let storage = Arc::new(FakeStorage::default());
    storage.put_dir("/media", vec![signed("/media/a.mp4", 1, "s1")]);
    storage.put_dir("/media/Action", vec![]);
    let clock = Arc::new(ManualClock::default());
    let listings = listing_cache(storage.clone(), clock.clone());
    let broker = broker(listings.clone(), clock.clone());

    listings.list("/media/Action").await.unwrap();
    assert!(broker.get_signed_url("a.mp4", SignedUrlKind::Video).await.is_some());
    assert_eq!(listings.purge_expired(), 0);
    assert_eq!(broker.purge_expired(), 0);

    clock.advance(Duration::from_secs(61));
    assert_eq!(listings.purge_expired(), 2);
    assert_eq!(broker.purge_expired(), 0);

    clock.advance(Duration::from_secs(240));
    assert_eq!(broker.purge_expired(), 1);
}

#[core_async::test]
async fn test_listing_errors_are_not_cached() {
    let storage = Arc::new(FakeStorage::default());
    let listings = listing_cache(storage.clone(), Arc::new(ManualClock::default()));

    let err = listings.list("/missing").await.unwrap_err();
    assert!(matches!(err, ProviderError::Api { code: 500, .. }));

    storage.put_dir("/missing", vec![]);
    assert!(listings.list("/missing").await.unwrap().is_empty());
    assert_eq!(storage.list_calls("/missing"), 2);
}

#[core_async::test]
async fn test_recursive_listing_skips_failing_branch() {
    let storage = Arc::new(FakeStorage::default());
    storage.put_dir(
        "/media",
        vec![
            FileEntry::directory("/media/Action"),
            FileEntry::directory("/media/Broken"),
            signed("/media/top.mp4", 5, "t"),
        ],
    );
    storage.put_dir("/media/Action", vec![signed("/media/Action/movie.mp4", 1024, "m")]);
    storage.fail_dir("/media/Broken");
    let listings = listing_cache(storage, Arc::new(ManualClock::default()));

    let tree = listings.list_recursive("/media").await;

    let mut paths: Vec<_> = tree.entries.iter().map(|e| e.path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["/media/Action/movie.mp4", "/media/top.mp4"]);
    assert_eq!(tree.failed_dirs, vec!["/media/Broken".to_string()]);
    assert!(!tree.is_complete());
}

#[core_async::test(multi_thread)]
async fn test_concurrent_signed_url_lookups_coalesce() {
    let storage = Arc::new(FakeStorage::with_latency(Duration::from_millis(50)));
    storage.put_dir("/media/Action", vec![signed("/media/Action/movie.mp4", 1024, "abc123:0")]);
    let clock = Arc::new(ManualClock::default());
    let broker = Arc::new(broker(listing_cache(storage.clone(), clock.clone()), clock));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let broker = Arc::clone(&broker);
        handles.push(core_async::spawn(async move {
            broker
                .get_signed_url("Action/movie.mp4", SignedUrlKind::Video)
                .await
        }));
    }

    for handle in handles {
        assert_eq!(
            handle.await.unwrap().as_deref(),
            Some("https://media.example.com/d/media/Action/movie.mp4?sign=abc123:0")
        );
    }
    assert_eq!(storage.total_list_calls(), 1);
    assert!(!broker.is_resolving("Action/movie.mp4", SignedUrlKind::Video));
}

#[core_async::test]
async fn test_signed_url_cached_until_ttl() {
    let storage = Arc::new(FakeStorage::default());
    storage.put_dir("/media", vec![signed("/media/a b.mp4", 1, "s1")]);
    let clock = Arc::new(ManualClock::default());
    let listings = listing_cache(storage.clone(), clock.clone());
    let broker = broker(listings.clone(), clock.clone());

    let first = broker.get_signed_url("a b.mp4", SignedUrlKind::Video).await;
    assert_eq!(
        first.as_deref(),
        Some("https://media.example.com/d/media/a%20b.mp4?sign=s1")
    );

    // A re-signed listing is not observed while the URL is cached.
    storage.put_dir("/media", vec![signed("/media/a b.mp4", 1, "s2")]);
    listings.invalidate(None);
    clock.advance(Duration::from_secs(299));
    assert_eq!(broker.get_signed_url("a b.mp4", SignedUrlKind::Video).await, first);

    clock.advance(Duration::from_secs(1));
    assert_eq!(
        broker.get_signed_url("a b.mp4", SignedUrlKind::Video).await.as_deref(),
        Some("https://media.example.com/d/media/a%20b.mp4?sign=s2")
    );

    storage.put_dir("/media", vec![signed("/media/a b.mp4", 1, "s3")]);
    listings.invalidate(None);
    broker.invalidate(Some("a b.mp4"));
    assert!(broker
        .get_signed_url("a b.mp4", SignedUrlKind::Video)
        .await
        .unwrap()
        .ends_with("sign=s3"));
}

#[core_async::test]
async fn test_bare_filename_found_by_recursive_search() {
    let storage = Arc::new(FakeStorage::default());
    storage.put_dir("/media", vec![FileEntry::directory("/media/Drama")]);
    storage.put_dir("/media/Drama", vec![signed("/media/Drama/film.mkv", 9, "d1")]);
    let clock = Arc::new(ManualClock::default());
    let broker = broker(listing_cache(storage, clock.clone()), clock);

    assert_eq!(
        broker.get_signed_url("film.mkv", SignedUrlKind::Video).await.as_deref(),
        Some("https://media.example.com/d/media/Drama/film.mkv?sign=d1")
    );
}

#[core_async::test]
async fn test_absolute_identifier_outside_upload_root() {
    let storage = Arc::new(FakeStorage::default());
    storage.put_dir("/archive", vec![signed("/archive/old.avi", 3, "o1")]);
    let clock = Arc::new(ManualClock::default());
    let broker = broker(listing_cache(storage, clock.clone()), clock);

    assert_eq!(
        broker.get_signed_url("/archive/old.avi", SignedUrlKind::Video).await.as_deref(),
        Some("https://media.example.com/d/archive/old.avi?sign=o1")
    );
}

#[core_async::test]
async fn test_thumbnail_falls_back_to_provider_preview() {
    let storage = Arc::new(FakeStorage::default());
    storage.put_dir(
        "/media/Action",
        vec![FileEntry::file("/media/Action/movie.mp4", 1024)
            .with_thumb("http://10.0.0.5:5244/thumb/movie?w=200&h=112")],
    );
    let clock = Arc::new(ManualClock::default());
    let broker = broker(listing_cache(storage, clock.clone()), clock);

    assert_eq!(
        broker
            .get_signed_url("Action/movie.jpg", SignedUrlKind::Thumbnail)
            .await
            .as_deref(),
        Some("https://media.example.com/thumb/movie?w=1280&h=720")
    );
}

#[core_async::test]
async fn test_unresolvable_identifier_is_none_and_not_cached() {
    let storage = Arc::new(FakeStorage::default());
    storage.put_dir("/media", vec![]);
    let clock = Arc::new(ManualClock::default());
    let listings = listing_cache(storage.clone(), clock.clone());
    let broker = broker(listings.clone(), clock);

    assert_eq!(broker.get_signed_url("ghost.mp4", SignedUrlKind::Video).await, None);

    storage.put_dir("/media", vec![signed("/media/ghost.mp4", 1, "g")]);
    listings.invalidate(None);
    assert!(broker.get_signed_url("ghost.mp4", SignedUrlKind::Video).await.is_some());
}

#[core_async::test]
async fn test_uploader_skips_same_name_and_size() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("movie.mp4");
    std::fs::write(&file, vec![0u8; 1024]).unwrap();

    let storage = Arc::new(FakeStorage::default());
    storage.put_dir("/media/Action", vec![FileEntry::file("/media/Action/movie.mp4", 1024)]);
    let uploader = RemoteUploader::new(listing_cache(storage.clone(), Arc::new(ManualClock::default())));

    let outcome = uploader.upload(&file, "/media/Action/movie.mp4").await.unwrap();

    assert!(outcome.skipped);
    assert!(!outcome.uploaded);
    assert!(storage.uploads().is_empty());
}

#[core_async::test]
async fn test_uploader_uploads_on_size_mismatch_and_invalidates() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("movie.mp4");
    std::fs::write(&file, vec![0u8; 2048]).unwrap();

    let storage = Arc::new(FakeStorage::default());
    storage.put_dir("/media/Action", vec![FileEntry::file("/media/Action/movie.mp4", 1024)]);
    let listings = listing_cache(storage.clone(), Arc::new(ManualClock::default()));
    let uploader = RemoteUploader::new(listings.clone());

    let outcome = uploader.upload(&file, "/media/Action/movie.mp4").await.unwrap();
    assert!(outcome.uploaded);
    assert_eq!(storage.uploads(), vec!["/media/Action/movie.mp4".to_string()]);

    listings.list("/media/Action").await.unwrap();
    assert_eq!(storage.list_calls("/media/Action"), 2);
}

#[core_async::test]
async fn test_uploader_proceeds_when_destination_listing_fails() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("new.mp4");
    std::fs::write(&file, b"data").unwrap();

    let storage = Arc::new(FakeStorage::default());
    let uploader = RemoteUploader::new(listing_cache(storage.clone(), Arc::new(ManualClock::default())));

    let outcome = uploader.upload(&file, "/media/New/new.mp4").await.unwrap();
    assert!(outcome.uploaded);
}

#[core_async::test]
async fn test_uploader_missing_local_file() {
    let storage = Arc::new(FakeStorage::default());
    let uploader = RemoteUploader::new(listing_cache(storage.clone(), Arc::new(ManualClock::default())));

    let err = uploader
        .upload(Path::new("/no/such/file.mp4"), "/media/file.mp4")
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::File(_)));
    assert!(!err.is_retryable());
    assert_eq!(storage.total_list_calls(), 0);
}

#[core_async::test]
async fn test_uploader_reports_api_failure() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("movie.mp4");
    std::fs::write(&file, b"data").unwrap();

    let storage = Arc::new(FakeStorage::default());
    storage.put_dir("/media", vec![]);
    *storage.upload_failure.lock().unwrap() = Some((403, "permission denied".to_string()));
    let uploader = RemoteUploader::new(listing_cache(storage, Arc::new(ManualClock::default())));

    let err = uploader.upload(&file, "/media/movie.mp4").await.unwrap_err();
    assert_eq!(
        err,
        ProviderError::Api {
            code: 403,
            message: "permission denied".to_string()
        }
    );
}

#[test]
fn test_services_are_shareable_across_tasks() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RemoteListingCache>();
    assert_send_sync::<SignedUrlBroker>();
    assert_send_sync::<RemoteUploader>();
}
