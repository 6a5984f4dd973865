//! Entity collection

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::bus::ChangedMessageBus;
use crate::domain::{Aggregate, CategoryId, Entity, EntityId, Tag, TagId};
use crate::error::{Error, Result};
use crate::storage::document::{CATEGORIES, DocumentRow, ENTITIES, EntityDocument, TAGS, parse_id};

use super::{Repository, TagRepository, all_ids, check_values, row_exists};

/// Entities, unique by name within a category scope
///
/// Tags are stored as references and resolved through the
/// [`TagRepository`] on every read, so readers always see the current
/// facet of each tag.
#[derive(Clone)]
pub struct EntityRepository {
    pool: SqlitePool,
    tags: TagRepository,
    bus: ChangedMessageBus<Entity>,
}

impl EntityRepository {
    pub fn new(pool: SqlitePool, tags: TagRepository, bus: ChangedMessageBus<Entity>) -> Self {
        Self { pool, tags, bus }
    }

    /// The bus this repository publishes on
    pub fn bus(&self) -> &ChangedMessageBus<Entity> {
        &self.bus
    }

    /// Every entity with this name, across all categories
    pub async fn find_by_name(&self, name: &str) -> Result<Vec<Entity>> {
        let rows: Vec<DocumentRow> =
            sqlx::query_as("SELECT id, document FROM entities WHERE name = ? ORDER BY rowid")
                .bind(name)
                .fetch_all(&self.pool)
                .await?;
        self.resolve_all(rows).await
    }

    /// Entities carrying a tag
    pub async fn find_by_tag(&self, tag: TagId) -> Result<Vec<Entity>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT e.id, e.document FROM entities e
            JOIN entity_tags t ON t.entity_id = e.id
            WHERE t.tag_id = ?
            ORDER BY e.rowid
            "#,
        )
        .bind(tag.to_string())
        .fetch_all(&self.pool)
        .await?;
        self.resolve_all(rows).await
    }

    /// Entities filed directly under a category; `None` selects the
    /// uncategorized ones
    pub async fn find_by_category(&self, category: Option<CategoryId>) -> Result<Vec<Entity>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, document FROM entities WHERE IFNULL(category_id, '') = ? ORDER BY rowid",
        )
        .bind(scope_key(category))
        .fetch_all(&self.pool)
        .await?;
        self.resolve_all(rows).await
    }

    /// The entity with this name in a category scope, if any
    pub async fn find_by_category_and_name(
        &self,
        category: Option<CategoryId>,
        name: &str,
    ) -> Result<Option<Entity>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT id, document FROM entities WHERE IFNULL(category_id, '') = ? AND name = ?",
        )
        .bind(scope_key(category))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.resolve(row.decode()?).await?)),
            None => Ok(None),
        }
    }

    /// Number of relationships that use the entity as either endpoint
    pub async fn reference_count(&self, id: EntityId) -> Result<usize> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM relationships WHERE from_id = ? OR to_id = ?")
                .bind(id.to_string())
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    /// Whether any relationship uses the entity as an endpoint
    pub async fn is_referenced(&self, id: EntityId) -> Result<bool> {
        Ok(self.reference_count(id).await? > 0)
    }

    /// Delete several entities, skipping refused ones
    ///
    /// Returns how many were actually deleted.
    pub async fn delete_many(&self, entities: &[Entity]) -> Result<usize> {
        let mut deleted = 0;
        for entity in entities {
            if self.delete(entity).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn resolve_all(&self, rows: Vec<DocumentRow>) -> Result<Vec<Entity>> {
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            entities.push(self.resolve(row.decode()?).await?);
        }
        Ok(entities)
    }

    async fn resolve(&self, doc: EntityDocument) -> Result<Entity> {
        let category = doc.category_id()?;
        let mut tags: Vec<Tag> = Vec::with_capacity(doc.tags.len());
        for tag_id in doc.tag_ids()? {
            match self.tags.find_optional(tag_id).await? {
                Some(tag) => tags.push(tag),
                None => {
                    warn!(entity_id = %doc.id, tag_id = %tag_id, "Skipping dangling tag reference")
                }
            }
        }
        debug!(entity_id = %doc.id, tags = tags.len(), "Entity references resolved");

        Ok(Entity {
            id: doc.id,
            name: doc.name,
            category,
            tags,
            values: doc.values,
        })
    }

    async fn check_references(&self, entity: &Entity) -> Result<()> {
        if let Some(category) = entity.category {
            if !row_exists(&self.pool, CATEGORIES, &category.to_string()).await? {
                return Err(Error::not_found("Category", category));
            }
        }
        for tag in &entity.tags {
            if !row_exists(&self.pool, TAGS, &tag.id.to_string()).await? {
                return Err(Error::not_found(Tag::KIND, tag.id));
            }
        }
        Ok(())
    }
}

/// Key of the uniqueness scope; uncategorized entities share the empty key
fn scope_key(category: Option<CategoryId>) -> String {
    category.map(|c| c.to_string()).unwrap_or_default()
}

#[async_trait]
impl Repository for EntityRepository {
    type Item = Entity;

    async fn upsert(&self, entity: &Entity) -> Result<Entity> {
        check_values(&entity.values)?;
        self.check_references(entity).await?;
        let document = serde_json::to_string(&EntityDocument::from(entity))?;
        let id = entity.id.to_string();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO entities (id, category_id, name, document) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                category_id = excluded.category_id,
                name = excluded.name,
                document = excluded.document
            "#,
        )
        .bind(&id)
        .bind(entity.category.map(|c| c.to_string()))
        .bind(&entity.name)
        .bind(&document)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::from_write(e, Entity::KIND, &entity.name))?;

        sqlx::query("DELETE FROM entity_tags WHERE entity_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        for (position, tag) in entity.tags.iter().enumerate() {
            sqlx::query("INSERT INTO entity_tags (entity_id, tag_id, position) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(tag.id.to_string())
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(entity_id = %entity.id, entity_name = %entity.name, "Entity saved");
        self.bus.modified(entity.clone())?;
        Ok(entity.clone())
    }

    async fn find_optional(&self, id: EntityId) -> Result<Option<Entity>> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT id, document FROM entities WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(self.resolve(row.decode()?).await?)),
            None => Ok(None),
        }
    }

    fn find_all(&self) -> BoxStream<'_, Result<Entity>> {
        Box::pin(async_stream::try_stream! {
            for id in all_ids(&self.pool, ENTITIES).await? {
                if let Some(entity) = self.find_optional(parse_id(&id)?).await? {
                    yield entity;
                }
            }
        })
    }

    async fn delete(&self, entity: &Entity) -> Result<bool> {
        let references = self.reference_count(entity.id).await?;
        if references > 0 {
            warn!(
                entity_id = %entity.id,
                relationships = references,
                "Refusing to delete entity still referenced by relationships"
            );
            return Ok(false);
        }

        let id = entity.id.to_string();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM entity_tags WHERE entity_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(entity_id = %entity.id, entity_name = %entity.name, "Entity deleted");
            self.bus.removed(entity.clone())?;
        }
        Ok(deleted)
    }
}
