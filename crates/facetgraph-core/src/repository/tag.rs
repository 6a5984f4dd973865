//! Tag collection

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::bus::ChangedMessageBus;
use crate::domain::{Aggregate, Tag, TagId};
use crate::error::{Error, Result};
use crate::storage::document::{DocumentRow, TAGS, TagDocument, parse_id};

use super::{Repository, all_ids};

/// Tags, unique by name
#[derive(Clone)]
pub struct TagRepository {
    pool: SqlitePool,
    bus: ChangedMessageBus<Tag>,
}

impl TagRepository {
    pub fn new(pool: SqlitePool, bus: ChangedMessageBus<Tag>) -> Self {
        Self { pool, bus }
    }

    /// The bus this repository publishes on
    pub fn bus(&self) -> &ChangedMessageBus<Tag> {
        &self.bus
    }

    /// Look up a tag by its unique name
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT id, document FROM tags WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.decode::<TagDocument>().map(Tag::from))
            .transpose()
    }

    /// Whether a tag already uses this name
    pub async fn exists_name(&self, name: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl Repository for TagRepository {
    type Item = Tag;

    async fn upsert(&self, tag: &Tag) -> Result<Tag> {
        let document = serde_json::to_string(&TagDocument::from(tag))?;

        sqlx::query(
            r#"
            INSERT INTO tags (id, name, document) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                document = excluded.document
            "#,
        )
        .bind(tag.id.to_string())
        .bind(&tag.name)
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_write(e, Tag::KIND, &tag.name))?;

        debug!(tag_id = %tag.id, tag_name = %tag.name, "Tag saved");
        self.bus.modified(tag.clone())?;
        Ok(tag.clone())
    }

    async fn find_optional(&self, id: TagId) -> Result<Option<Tag>> {
        let row: Option<DocumentRow> = sqlx::query_as("SELECT id, document FROM tags WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.decode::<TagDocument>().map(Tag::from))
            .transpose()
    }

    fn find_all(&self) -> BoxStream<'_, Result<Tag>> {
        Box::pin(async_stream::try_stream! {
            for id in all_ids(&self.pool, TAGS).await? {
                if let Some(tag) = self.find_optional(parse_id(&id)?).await? {
                    yield tag;
                }
            }
        })
    }

    async fn delete(&self, tag: &Tag) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(tag.id.to_string())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(tag_id = %tag.id, tag_name = %tag.name, "Tag deleted");
            self.bus.removed(tag.clone())?;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChangeKind;
    use crate::domain::{FacetProperty, PropertyType};
    use crate::storage::Database;
    use futures_util::TryStreamExt;
    use std::sync::{Arc, Mutex};

    async fn setup() -> (Database, TagRepository) {
        let db = Database::in_memory().await.expect("Failed to create database");
        let repo = TagRepository::new(db.pool().clone(), ChangedMessageBus::new("tags"));
        (db, repo)
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let (_db, repo) = setup().await;

        let mut tag = Tag::new("person");
        tag.facet_mut()
            .add_property(FacetProperty::new("age", PropertyType::Long))
            .unwrap();
        repo.upsert(&tag).await.unwrap();

        let found = repo.find_by_id(tag.id).await.unwrap();
        assert_eq!(found, tag);
        assert_eq!(repo.find_by_name("person").await.unwrap(), Some(tag.clone()));
        assert!(repo.exists_name("person").await.unwrap());
        assert!(!repo.exists_name("place").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_id_missing_is_not_found() {
        let (_db, repo) = setup().await;

        let err = repo.find_by_id(TagId::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(repo.find_optional(TagId::new()).await.unwrap().is_none());
        assert!(repo.find_by_name("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let (_db, repo) = setup().await;

        repo.upsert(&Tag::new("person")).await.unwrap();
        let err = repo.upsert(&Tag::new("person")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateName { kind: "Tag", .. }));
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let (_db, repo) = setup().await;

        let mut tag = Tag::new("person");
        repo.upsert(&tag).await.unwrap();
        tag.name = "human".into();
        repo.upsert(&tag).await.unwrap();

        let all: Vec<Tag> = repo.find_all().try_collect().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "human");
        assert!(repo.find_by_name("person").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_publishes_removed() {
        let (_db, repo) = setup().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = repo.bus().subscribe(move |msg| {
            seen_clone.lock().unwrap().push(msg.kind);
            Ok(())
        });

        let tag = Tag::new("person");
        repo.upsert(&tag).await.unwrap();
        assert!(repo.delete(&tag).await.unwrap());
        assert!(!repo.delete(&tag).await.unwrap());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChangeKind::Modified, ChangeKind::Removed]
        );
    }
}
