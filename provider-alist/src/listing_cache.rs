//! Cached remote directory listings
//!
//! One [`RemoteListingCache`] is created at start-up and shared by `Arc`. A
//! miss triggers exactly one `list_directory` call per directory no matter
//! how many callers ask concurrently; failures are handed to every waiter and
//! never cached.

use bridge_traits::storage::{FileEntry, RemoteStorage};
use bridge_traits::time::Clock;
use core_async::SingleFlight;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{ProviderError, Result};
use crate::remote_path;
use crate::ttl_cache::TtlCache;

type Listing = Arc<Vec<FileEntry>>;

/// Files found below a remote root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTree {
    /// Every non-directory entry that could be listed.
    pub entries: Vec<FileEntry>,
    /// Directories whose listing failed; their branches are missing from
    /// `entries`.
    pub failed_dirs: Vec<String>,
}

impl RemoteTree {
    /// `true` when every directory listed successfully.
    pub fn is_complete(&self) -> bool {
        self.failed_dirs.is_empty()
    }
}

pub struct RemoteListingCache {
    storage: Arc<dyn RemoteStorage>,
    cache: Arc<TtlCache<Listing>>,
    flights: SingleFlight<String, Result<Listing>>,
}

impl RemoteListingCache {
    pub fn new(storage: Arc<dyn RemoteStorage>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            cache: Arc::new(TtlCache::new(ttl, clock)),
            flights: SingleFlight::new(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn RemoteStorage> {
        &self.storage
    }

    /// Direct children of `remote_dir`.
    #[instrument(skip(self))]
    pub async fn list(&self, remote_dir: &str) -> Result<Listing> {
        let dir = remote_path::normalize_dir(remote_dir);

        if let Some(hit) = self.cache.get(&dir) {
            debug!(dir = %dir, "Listing cache hit");
            return Ok(hit);
        }

        let storage = Arc::clone(&self.storage);
        let cache = Arc::clone(&self.cache);
        let key = dir.clone();

        self.flights
            .run(dir, move || async move {
                let listing = storage
                    .list_directory(&key)
                    .await
                    .map(Arc::new)
                    .map_err(ProviderError::from)?;
                cache.insert(key.clone(), Arc::clone(&listing));
                debug!(dir = %key, entries = listing.len(), "Listing cached");
                Ok(listing)
            })
            .await
    }

    /// Every file below `root`, depth first.
    ///
    /// A directory that fails to list is logged and recorded in
    /// [`RemoteTree::failed_dirs`]; the walk continues with its siblings.
    #[instrument(skip(self))]
    pub async fn list_recursive(&self, root: &str) -> RemoteTree {
        let mut tree = RemoteTree::default();
        let mut stack = vec![remote_path::normalize_dir(root)];
        let mut visited = HashSet::new();

        while let Some(dir) = stack.pop() {
            if !visited.insert(dir.clone()) {
                continue;
            }

            let listing = match self.list(&dir).await {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(dir = %dir, error = %e, "Skipping remote directory");
                    tree.failed_dirs.push(dir);
                    continue;
                }
            };

            // Reversed so siblings are visited in listing order.
            for entry in listing.iter().rev() {
                if entry.is_directory {
                    stack.push(entry.path.clone());
                }
            }
            tree.entries
                .extend(listing.iter().filter(|entry| !entry.is_directory).cloned());
        }

        debug!(
            files = tree.entries.len(),
            failed = tree.failed_dirs.len(),
            "Remote walk finished"
        );
        tree
    }

    /// Drops expired listings, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Drops the cached listing of one directory, or of every directory.
    pub fn invalidate(&self, remote_dir: Option<&str>) {
        match remote_dir {
            Some(dir) => {
                self.cache.remove(&remote_path::normalize_dir(dir));
            }
            None => self.cache.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_tree_completeness() {
        let mut tree = RemoteTree::default();
        assert!(tree.is_complete());
        tree.failed_dirs.push("/media/broken".to_string());
        assert!(!tree.is_complete());
    }
}
