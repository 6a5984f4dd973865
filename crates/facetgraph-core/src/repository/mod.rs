//! Repositories over the document collections
//!
//! Every repository shares the [`Repository`] contract: `upsert` inserts or
//! replaces by id, `find_by_id` fails with [`Error::NotFound`] on a missing
//! id, `find_all` is a lazy stream, and `delete` reports whether anything
//! was removed. Repositories that own a change bus publish after each
//! successful write, never before.

mod category;
mod entity;
mod relationship;
mod tag;

pub use category::CategoryRepository;
pub use entity::EntityRepository;
pub use relationship::RelationshipRepository;
pub use tag::TagRepository;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use sqlx::SqlitePool;

use crate::domain::{Aggregate, Values};
use crate::error::{Error, Result};

/// Common persistence contract of the four aggregate collections
#[async_trait]
pub trait Repository: Send + Sync {
    type Item: Aggregate;

    /// Insert the item if its id is absent, otherwise replace it
    async fn upsert(&self, item: &Self::Item) -> Result<Self::Item>;

    /// Look up an item, returning `None` when absent
    async fn find_optional(
        &self,
        id: <Self::Item as Aggregate>::Id,
    ) -> Result<Option<Self::Item>>;

    /// Look up an item that is expected to exist
    async fn find_by_id(&self, id: <Self::Item as Aggregate>::Id) -> Result<Self::Item> {
        self.find_optional(id)
            .await?
            .ok_or_else(|| Error::not_found(<Self::Item as Aggregate>::KIND, id))
    }

    /// Stream every item in insertion order, loading one document at a time
    fn find_all(&self) -> BoxStream<'_, Result<Self::Item>>;

    /// Delete an item; `false` when it was absent or the delete was refused
    async fn delete(&self, item: &Self::Item) -> Result<bool>;
}

/// Whether a row with this id exists in `table`
pub(crate) async fn row_exists(pool: &SqlitePool, table: &str, id: &str) -> Result<bool> {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {} WHERE id = ?", table))
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Ids of every row of `table` in insertion order
pub(crate) async fn all_ids(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(&format!("SELECT id FROM {} ORDER BY rowid", table))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Reject values that cannot be written to a JSON document
pub(crate) fn check_values(values: &Values) -> Result<()> {
    match values.iter().find(|(_, v)| !v.is_storable()) {
        Some((property, value)) => Err(Error::InvalidDocument(format!(
            "value {} of property {} cannot be stored",
            value, property
        ))),
        None => Ok(()),
    }
}
