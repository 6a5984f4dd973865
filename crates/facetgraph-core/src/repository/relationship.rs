//! Relationship collection

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::bus::ChangedMessageBus;
use crate::domain::{Aggregate, Entity, EntityId, Relationship, RelationshipId, Tag, TagId};
use crate::error::{Error, Result};
use crate::storage::document::{
    DocumentRow, ENTITIES, RELATIONSHIPS, RelationshipDocument, TAGS, parse_id,
};

use super::{Repository, TagRepository, all_ids, check_values, row_exists};

/// Relationships between entities
///
/// Endpoints and tags are stored as references. Both endpoints must exist
/// when a relationship is saved.
#[derive(Clone)]
pub struct RelationshipRepository {
    pool: SqlitePool,
    tags: TagRepository,
    bus: ChangedMessageBus<Relationship>,
}

impl RelationshipRepository {
    pub fn new(
        pool: SqlitePool,
        tags: TagRepository,
        bus: ChangedMessageBus<Relationship>,
    ) -> Self {
        Self { pool, tags, bus }
    }

    /// The bus this repository publishes on
    pub fn bus(&self) -> &ChangedMessageBus<Relationship> {
        &self.bus
    }

    /// Relationships where the entity is either endpoint
    pub async fn find_by_entity(&self, entity: EntityId) -> Result<Vec<Relationship>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, document FROM relationships WHERE from_id = ? OR to_id = ? ORDER BY rowid",
        )
        .bind(entity.to_string())
        .bind(entity.to_string())
        .fetch_all(&self.pool)
        .await?;
        self.resolve_all(rows).await
    }

    /// Relationships carrying a tag
    pub async fn find_by_tag(&self, tag: TagId) -> Result<Vec<Relationship>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.document FROM relationships r
            JOIN relationship_tags t ON t.relationship_id = r.id
            WHERE t.tag_id = ?
            ORDER BY r.rowid
            "#,
        )
        .bind(tag.to_string())
        .fetch_all(&self.pool)
        .await?;
        self.resolve_all(rows).await
    }

    /// Delete several relationships, returning how many existed
    pub async fn delete_many(&self, relationships: &[Relationship]) -> Result<usize> {
        let mut deleted = 0;
        for relationship in relationships {
            if self.delete(relationship).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn resolve_all(&self, rows: Vec<DocumentRow>) -> Result<Vec<Relationship>> {
        let mut relationships = Vec::with_capacity(rows.len());
        for row in rows {
            relationships.push(self.resolve(row.decode()?).await?);
        }
        Ok(relationships)
    }

    async fn resolve(&self, doc: RelationshipDocument) -> Result<Relationship> {
        let (from, to) = doc.endpoints()?;
        let mut tags: Vec<Tag> = Vec::with_capacity(doc.tags.len());
        for tag_id in doc.tag_ids()? {
            match self.tags.find_optional(tag_id).await? {
                Some(tag) => tags.push(tag),
                None => warn!(
                    relationship_id = %doc.id,
                    tag_id = %tag_id,
                    "Skipping dangling tag reference"
                ),
            }
        }

        Ok(Relationship {
            id: doc.id,
            name: doc.name,
            from,
            to,
            tags,
            values: doc.values,
        })
    }

    async fn check_references(&self, relationship: &Relationship) -> Result<()> {
        for endpoint in [relationship.from, relationship.to] {
            if !row_exists(&self.pool, ENTITIES, &endpoint.to_string()).await? {
                return Err(Error::not_found(Entity::KIND, endpoint));
            }
        }
        for tag in &relationship.tags {
            if !row_exists(&self.pool, TAGS, &tag.id.to_string()).await? {
                return Err(Error::not_found(Tag::KIND, tag.id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for RelationshipRepository {
    type Item = Relationship;

    async fn upsert(&self, relationship: &Relationship) -> Result<Relationship> {
        check_values(&relationship.values)?;
        self.check_references(relationship).await?;
        let document = serde_json::to_string(&RelationshipDocument::from(relationship))?;
        let id = relationship.id.to_string();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO relationships (id, from_id, to_id, name, document) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                from_id = excluded.from_id,
                to_id = excluded.to_id,
                name = excluded.name,
                document = excluded.document
            "#,
        )
        .bind(&id)
        .bind(relationship.from.to_string())
        .bind(relationship.to.to_string())
        .bind(&relationship.name)
        .bind(&document)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::from_write(e, Relationship::KIND, &relationship.name))?;

        sqlx::query("DELETE FROM relationship_tags WHERE relationship_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        for (position, tag) in relationship.tags.iter().enumerate() {
            sqlx::query(
                "INSERT INTO relationship_tags (relationship_id, tag_id, position) VALUES (?, ?, ?)",
            )
            .bind(&id)
            .bind(tag.id.to_string())
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            relationship_id = %relationship.id,
            from = %relationship.from,
            to = %relationship.to,
            "Relationship saved"
        );
        self.bus.modified(relationship.clone())?;
        Ok(relationship.clone())
    }

    async fn find_optional(&self, id: RelationshipId) -> Result<Option<Relationship>> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT id, document FROM relationships WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(self.resolve(row.decode()?).await?)),
            None => Ok(None),
        }
    }

    fn find_all(&self) -> BoxStream<'_, Result<Relationship>> {
        Box::pin(async_stream::try_stream! {
            for id in all_ids(&self.pool, RELATIONSHIPS).await? {
                if let Some(relationship) = self.find_optional(parse_id(&id)?).await? {
                    yield relationship;
                }
            }
        })
    }

    async fn delete(&self, relationship: &Relationship) -> Result<bool> {
        let id = relationship.id.to_string();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM relationship_tags WHERE relationship_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM relationships WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(relationship_id = %relationship.id, "Relationship deleted");
            self.bus.removed(relationship.clone())?;
        }
        Ok(deleted)
    }
}
