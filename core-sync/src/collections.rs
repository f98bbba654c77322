//! Folder-named collections
//!
//! New videos found in a sub-folder are linked to a collection named after
//! that folder. Lookups for the same name are coalesced, so concurrent lanes
//! that discover files in one folder create exactly one collection.

use core_async::SingleFlight;
use core_library::{Catalog, CollectionRecord};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{Result, SyncError};

type Lookup = std::result::Result<String, String>;

pub struct CollectionAutoCreator {
    catalog: Arc<dyn Catalog>,
    events: EventBus,
    flights: SingleFlight<String, Lookup>,
}

impl CollectionAutoCreator {
    pub fn new(catalog: Arc<dyn Catalog>, events: EventBus) -> Self {
        Self {
            catalog,
            events,
            flights: SingleFlight::new(),
        }
    }

    /// Id of the collection called `name`, created if missing.
    #[instrument(skip(self))]
    pub async fn find_or_create(&self, name: &str) -> Result<String> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(SyncError::InvalidInput(
                "Collection name cannot be empty".to_string(),
            ));
        }

        let catalog = Arc::clone(&self.catalog);
        let events = self.events.clone();
        let key = name.clone();

        self.flights
            .run(key, move || async move {
                if let Some(existing) = catalog
                    .get_collection_by_name(&name)
                    .await
                    .map_err(|e| e.to_string())?
                {
                    debug!(collection_id = %existing.id, "Collection exists");
                    return Ok(existing.id);
                }

                let collection = CollectionRecord::new(name.clone());
                catalog
                    .save_collection(&collection)
                    .await
                    .map_err(|e| e.to_string())?;

                info!(collection_id = %collection.id, name = %name, "Collection created");
                let _ = events.emit(CoreEvent::Library(LibraryEvent::CollectionCreated {
                    collection_id: collection.id.clone(),
                    name,
                }));
                Ok(collection.id)
            })
            .await
            .map_err(SyncError::Database)
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.flights.is_in_flight(&name.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::db::create_test_pool;
    use core_library::SqliteCatalog;

    async fn creator() -> (Arc<CollectionAutoCreator>, SqliteCatalog) {
        let catalog = SqliteCatalog::new(create_test_pool().await.unwrap());
        let creator = CollectionAutoCreator::new(Arc::new(catalog.clone()), EventBus::default());
        (Arc::new(creator), catalog)
    }

    #[core_async::test]
    async fn test_creates_once_and_reuses() {
        let (creator, catalog) = creator().await;

        let first = creator.find_or_create("Action").await.unwrap();
        let second = creator.find_or_create(" Action ").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(catalog.list_collections().await.unwrap().len(), 1);
        assert!(!creator.is_pending("Action"));
    }

    #[core_async::test]
    async fn test_concurrent_requests_create_one_collection() {
        let (creator, catalog) = creator().await;

        let ids = futures::future::join_all((0..10).map(|_| creator.find_or_create("Drama"))).await;
        let ids: Vec<String> = ids.into_iter().map(|id| id.unwrap()).collect();

        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(catalog.list_collections().await.unwrap().len(), 1);
    }

    #[core_async::test]
    async fn test_emits_creation_event() {
        let catalog = SqliteCatalog::new(create_test_pool().await.unwrap());
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let creator = CollectionAutoCreator::new(Arc::new(catalog), events);

        let id = creator.find_or_create("Comedy").await.unwrap();

        match rx.recv().await.unwrap() {
            CoreEvent::Library(LibraryEvent::CollectionCreated { collection_id, name }) => {
                assert_eq!(collection_id, id);
                assert_eq!(name, "Comedy");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[core_async::test]
    async fn test_blank_name_rejected() {
        let (creator, _) = creator().await;
        assert!(matches!(
            creator.find_or_create("  ").await,
            Err(SyncError::InvalidInput(_))
        ));
    }
}
