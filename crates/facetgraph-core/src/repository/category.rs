//! Category tree collection

use std::collections::HashSet;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::domain::{Aggregate, Category, CategoryId, Facet};
use crate::error::{Error, Result};
use crate::storage::document::{CATEGORIES, CategoryDocument, DocumentRow, parse_id};

use super::{Repository, all_ids, row_exists};

/// The category tree
///
/// Sibling names are unique below one parent. Only the root may be saved
/// without a parent. Categories have no change bus.
#[derive(Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The root category, created on first access
    pub async fn root(&self) -> Result<Category> {
        if let Some(root) = self.find_optional(CategoryId::ROOT).await? {
            return Ok(root);
        }

        let root = Category::root();
        self.upsert(&root).await?;
        info!(category_id = %root.id, "Root category created");
        Ok(root)
    }

    /// The sub-category of `parent` with this name, if any
    pub async fn find_by_category_and_name(
        &self,
        parent: CategoryId,
        name: &str,
    ) -> Result<Option<Category>> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT id, document FROM categories WHERE parent_id = ? AND name = ?")
                .bind(parent.to_string())
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.decode::<CategoryDocument>()?.into_category())
            .transpose()
    }

    /// Direct children of a category, in creation order
    pub async fn sub_categories(&self, category: CategoryId) -> Result<Vec<Category>> {
        let rows: Vec<DocumentRow> =
            sqlx::query_as("SELECT id, document FROM categories WHERE parent_id = ? ORDER BY rowid")
                .bind(category.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|r| r.decode::<CategoryDocument>()?.into_category())
            .collect()
    }

    /// The category followed by its ancestors, ending with the root
    pub async fn ancestry(&self, category: &Category) -> Result<Vec<Category>> {
        let mut chain = vec![category.clone()];
        let mut seen = HashSet::from([category.id]);
        let mut next = category.parent;

        while let Some(parent_id) = next {
            if !seen.insert(parent_id) {
                return Err(Error::InvalidDocument(format!(
                    "category '{}' is its own ancestor",
                    parent_id
                )));
            }
            match self.find_optional(parent_id).await? {
                Some(parent) => {
                    next = parent.parent;
                    chain.push(parent);
                }
                None => {
                    warn!(category_id = %parent_id, "Category ancestry ends at a missing parent");
                    break;
                }
            }
        }
        Ok(chain)
    }

    /// Facets of the category and its ancestors, nearest first
    pub async fn facets(&self, category: &Category) -> Result<Vec<Facet>> {
        let chain = self.ancestry(category).await?;
        Ok(chain.into_iter().map(|c| c.facet).collect())
    }
}

#[async_trait]
impl Repository for CategoryRepository {
    type Item = Category;

    async fn upsert(&self, category: &Category) -> Result<Category> {
        let parent = match category.parent {
            Some(parent) => Some(parent),
            None if category.is_root() => None,
            None => return Err(Error::CategoryMustHaveParent(category.id.to_string())),
        };
        if let Some(parent) = parent {
            if !row_exists(&self.pool, CATEGORIES, &parent.to_string()).await? {
                return Err(Error::not_found(Category::KIND, parent));
            }
        }

        let document = serde_json::to_string(&CategoryDocument::from(category))?;

        sqlx::query(
            r#"
            INSERT INTO categories (id, parent_id, name, document) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                parent_id = excluded.parent_id,
                name = excluded.name,
                document = excluded.document
            "#,
        )
        .bind(category.id.to_string())
        .bind(parent.map(|p| p.to_string()))
        .bind(&category.name)
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_write(e, Category::KIND, &category.name))?;

        debug!(category_id = %category.id, category_name = %category.name, "Category saved");
        Ok(category.clone())
    }

    async fn find_optional(&self, id: CategoryId) -> Result<Option<Category>> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT id, document FROM categories WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.decode::<CategoryDocument>()?.into_category())
            .transpose()
    }

    fn find_all(&self) -> BoxStream<'_, Result<Category>> {
        Box::pin(async_stream::try_stream! {
            for id in all_ids(&self.pool, CATEGORIES).await? {
                if let Some(category) = self.find_optional(parse_id(&id)?).await? {
                    yield category;
                }
            }
        })
    }

    async fn delete(&self, category: &Category) -> Result<bool> {
        if category.is_root() {
            warn!("Refusing to delete the root category");
            return Ok(false);
        }

        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(category.id.to_string())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(category_id = %category.id, category_name = %category.name, "Category deleted");
        }
        Ok(deleted)
    }
}
