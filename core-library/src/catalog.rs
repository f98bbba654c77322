//! Catalog collaborator trait and its SQLite implementation

use crate::error::{LibraryError, Result};
use crate::models::{CatalogEntry, CollectionRecord, VideoRecord};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

/// Record store the sync engine reconciles against.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every cataloged video keyed by storage path.
    async fn get_videos_by_path(&self) -> Result<HashMap<String, CatalogEntry>>;

    /// Insert a video or update the one with the same id.
    ///
    /// `added_at` of an existing record is preserved.
    async fn upsert_video(&self, video: &VideoRecord) -> Result<()>;

    /// Delete a video by id.
    ///
    /// # Returns
    /// - `Ok(true)` if the video was deleted
    /// - `Ok(false)` if no video had that id
    async fn delete_video(&self, id: &str) -> Result<bool>;

    async fn get_collection_by_name(&self, name: &str) -> Result<Option<CollectionRecord>>;

    /// Insert a collection or update the one with the same id.
    async fn save_collection(&self, collection: &CollectionRecord) -> Result<()>;

    /// Link a video to a collection. Linking twice is a no-op.
    async fn add_video_to_collection(&self, collection_id: &str, video_id: &str) -> Result<()>;
}

/// SQLite implementation of [`Catalog`]
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        let video = query_as::<_, VideoRecord>(
            r#"
            SELECT id, title, video_filename, video_path, thumbnail_filename, thumbnail_path,
                   duration, file_size, source, added_at
            FROM videos WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(video)
    }

    pub async fn get_video_by_path(&self, video_path: &str) -> Result<Option<VideoRecord>> {
        let video = query_as::<_, VideoRecord>(
            r#"
            SELECT id, title, video_filename, video_path, thumbnail_filename, thumbnail_path,
                   duration, file_size, source, added_at
            FROM videos WHERE video_path = ?
            "#,
        )
        .bind(video_path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(video)
    }

    /// All videos ordered by storage path.
    pub async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        let videos = query_as::<_, VideoRecord>(
            r#"
            SELECT id, title, video_filename, video_path, thumbnail_filename, thumbnail_path,
                   duration, file_size, source, added_at
            FROM videos ORDER BY video_path
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(videos)
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionRecord>> {
        let collections = query_as::<_, CollectionRecord>(
            "SELECT id, name, title, created_at FROM collections ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(collections)
    }

    pub async fn collection_video_ids(&self, collection_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = query_as(
            "SELECT video_id FROM collection_videos WHERE collection_id = ? ORDER BY video_id",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn count_videos(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM videos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn get_videos_by_path(&self) -> Result<HashMap<String, CatalogEntry>> {
        let rows: Vec<(String, String, i64)> =
            query_as("SELECT video_path, id, file_size FROM videos")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(path, id, file_size)| (path, CatalogEntry { id, file_size }))
            .collect())
    }

    async fn upsert_video(&self, video: &VideoRecord) -> Result<()> {
        video.validate().map_err(|e| LibraryError::InvalidInput {
            field: "VideoRecord".to_string(),
            message: e,
        })?;

        let now = chrono::Utc::now().timestamp();

        query(
            r#"
            INSERT INTO videos (
                id, title, video_filename, video_path, thumbnail_filename, thumbnail_path,
                duration, file_size, source, added_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                video_filename = excluded.video_filename,
                video_path = excluded.video_path,
                thumbnail_filename = excluded.thumbnail_filename,
                thumbnail_path = excluded.thumbnail_path,
                duration = excluded.duration,
                file_size = excluded.file_size,
                source = excluded.source,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&video.id)
        .bind(&video.title)
        .bind(&video.video_filename)
        .bind(&video.video_path)
        .bind(&video.thumbnail_filename)
        .bind(&video.thumbnail_path)
        .bind(video.duration)
        .bind(video.file_size)
        .bind(video.source)
        .bind(video.added_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(video_id = %video.id, source = %video.source, "Video upserted");
        Ok(())
    }

    async fn delete_video(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_collection_by_name(&self, name: &str) -> Result<Option<CollectionRecord>> {
        let collection = query_as::<_, CollectionRecord>(
            "SELECT id, name, title, created_at FROM collections WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(collection)
    }

    async fn save_collection(&self, collection: &CollectionRecord) -> Result<()> {
        if collection.name.trim().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "CollectionRecord.name".to_string(),
                message: "Collection name cannot be empty".to_string(),
            });
        }

        query(
            r#"
            INSERT INTO collections (id, name, title, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                title = excluded.title
            "#,
        )
        .bind(&collection.id)
        .bind(&collection.name)
        .bind(&collection.title)
        .bind(collection.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_video_to_collection(&self, collection_id: &str, video_id: &str) -> Result<()> {
        let result = query(
            r#"
            INSERT OR IGNORE INTO collection_videos (collection_id, video_id, added_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(collection_id)
        .bind(video_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                Err(LibraryError::NotFound {
                    entity_type: "collection or video".to_string(),
                    id: format!("{}/{}", collection_id, video_id),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::VideoSource;

    async fn catalog() -> SqliteCatalog {
        SqliteCatalog::new(create_test_pool().await.unwrap())
    }

    fn video(id: &str, path: &str, size: i64) -> VideoRecord {
        let filename = path.rsplit('/').next().unwrap_or(path).to_string();
        let mut record = VideoRecord::new(id, path, filename, VideoSource::Local);
        record.file_size = size;
        record
    }

    #[core_async::test]
    async fn test_upsert_and_snapshot() {
        let catalog = catalog().await;
        catalog.upsert_video(&video("v1", "/videos/a.mp4", 100)).await.unwrap();
        catalog.upsert_video(&video("v2", "/videos/b.mp4", 200)).await.unwrap();

        let snapshot = catalog.get_videos_by_path().await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.get("/videos/b.mp4"),
            Some(&CatalogEntry { id: "v2".to_string(), file_size: 200 })
        );
    }

    #[core_async::test]
    async fn test_upsert_preserves_added_at() {
        let catalog = catalog().await;
        let mut first = video("v1", "/videos/a.mp4", 100);
        first.added_at = 1_000;
        catalog.upsert_video(&first).await.unwrap();

        let mut second = video("v1", "/videos/a.mp4", 1024);
        second.added_at = 2_000;
        second.duration = Some(42);
        catalog.upsert_video(&second).await.unwrap();

        let stored = catalog.get_video("v1").await.unwrap().unwrap();
        assert_eq!(stored.added_at, 1_000);
        assert_eq!(stored.file_size, 1024);
        assert_eq!(stored.duration, Some(42));
        assert_eq!(catalog.count_videos().await.unwrap(), 1);
    }

    #[core_async::test]
    async fn test_delete_video_reports_presence() {
        let catalog = catalog().await;
        catalog.upsert_video(&video("v1", "/videos/a.mp4", 1)).await.unwrap();

        assert!(catalog.delete_video("v1").await.unwrap());
        assert!(!catalog.delete_video("v1").await.unwrap());
    }

    #[core_async::test]
    async fn test_collections_and_links() {
        let catalog = catalog().await;
        catalog.upsert_video(&video("v1", "/videos/Action/movie.mp4", 1)).await.unwrap();

        let collection = CollectionRecord::new("Action");
        catalog.save_collection(&collection).await.unwrap();

        let found = catalog.get_collection_by_name("Action").await.unwrap().unwrap();
        assert_eq!(found.id, collection.id);
        assert!(catalog.get_collection_by_name("Drama").await.unwrap().is_none());

        catalog.add_video_to_collection(&collection.id, "v1").await.unwrap();
        catalog.add_video_to_collection(&collection.id, "v1").await.unwrap();
        assert_eq!(
            catalog.collection_video_ids(&collection.id).await.unwrap(),
            vec!["v1".to_string()]
        );

        catalog.delete_video("v1").await.unwrap();
        assert!(catalog.collection_video_ids(&collection.id).await.unwrap().is_empty());
    }

    #[core_async::test]
    async fn test_link_to_missing_video_is_not_found() {
        let catalog = catalog().await;
        let collection = CollectionRecord::new("Action");
        catalog.save_collection(&collection).await.unwrap();

        let err = catalog
            .add_video_to_collection(&collection.id, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[core_async::test]
    async fn test_invalid_video_rejected() {
        let catalog = catalog().await;
        let err = catalog.upsert_video(&video("", "/videos/a.mp4", 1)).await.unwrap_err();
        assert!(matches!(err, LibraryError::InvalidInput { .. }));
    }
}
