//! Category removal

use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::domain::{Category, CategoryId, Entity};
use crate::error::{Error, Result};
use crate::repository::{CategoryRepository, EntityRepository, Repository};

/// Deletes categories, either one empty node or a whole subtree
#[derive(Clone)]
pub struct CategoryRemovalTraverser {
    categories: CategoryRepository,
    entities: EntityRepository,
}

impl CategoryRemovalTraverser {
    pub fn new(categories: CategoryRepository, entities: EntityRepository) -> Self {
        Self {
            categories,
            entities,
        }
    }

    /// Delete the category only if it has no sub-categories and no entities
    ///
    /// Returns `false` without changing anything for the root or a
    /// non-empty category.
    pub async fn delete_if_empty(&self, category: &Category) -> Result<bool> {
        if category.is_root() {
            warn!("Refusing to delete the root category");
            return Ok(false);
        }
        if !self.categories.sub_categories(category.id).await?.is_empty() {
            warn!(category_id = %category.id, "Category has sub-categories, not deleting");
            return Ok(false);
        }
        if !self
            .entities
            .find_by_category(Some(category.id))
            .await?
            .is_empty()
        {
            warn!(category_id = %category.id, "Category has entities, not deleting");
            return Ok(false);
        }

        let deleted = self.categories.delete(category).await?;
        if deleted {
            self.detach(category).await?;
        }
        Ok(deleted)
    }

    /// Delete the category with all its sub-categories and entities
    ///
    /// The whole subtree is checked first: if any entity in it is still an
    /// endpoint of a relationship, [`Error::EntityInUse`] is returned and
    /// nothing is deleted. Returns `false` for the root and for a category
    /// that is not stored.
    pub async fn delete_recursively(&self, category: &Category) -> Result<bool> {
        if category.is_root() {
            warn!("Refusing to delete the root category");
            return Ok(false);
        }
        if self.categories.find_optional(category.id).await?.is_none() {
            debug!(category_id = %category.id, "Category not stored, nothing to delete");
            return Ok(false);
        }

        let mut entities = Vec::new();
        self.collect_entities(category.id, &mut entities).await?;
        for entity in &entities {
            let relationships = self.entities.reference_count(entity.id).await?;
            if relationships > 0 {
                return Err(Error::EntityInUse {
                    entity: entity.name.clone(),
                    relationships,
                });
            }
        }

        let removed = self.delete_subtree(category.id).await?;
        self.detach(category).await?;
        info!(
            category_id = %category.id,
            categories = removed,
            entities = entities.len(),
            "Category subtree deleted"
        );
        Ok(true)
    }

    fn collect_entities<'a>(
        &'a self,
        category: CategoryId,
        out: &'a mut Vec<Entity>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            out.extend(self.entities.find_by_category(Some(category)).await?);
            for child in self.categories.sub_categories(category).await? {
                self.collect_entities(child.id, out).await?;
            }
            Ok(())
        })
    }

    /// Delete children first, then the node's entities, then the node
    fn delete_subtree(&self, category: CategoryId) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let mut removed = 0;
            for child in self.categories.sub_categories(category).await? {
                removed += self.delete_subtree(child.id).await?;
            }

            for entity in self.entities.find_by_category(Some(category)).await? {
                if !self.entities.delete(&entity).await? {
                    return Err(Error::EntityInUse {
                        relationships: self.entities.reference_count(entity.id).await?,
                        entity: entity.name,
                    });
                }
            }

            if let Some(node) = self.categories.find_optional(category).await? {
                if self.categories.delete(&node).await? {
                    removed += 1;
                }
            }
            debug!(category_id = %category, "Category node deleted");
            Ok(removed)
        })
    }

    /// Drop a deleted category from its parent's sub-category list
    async fn detach(&self, category: &Category) -> Result<()> {
        let Some(parent_id) = category.parent else {
            return Ok(());
        };
        if let Some(mut parent) = self.categories.find_optional(parent_id).await? {
            if parent.remove_sub_category(category.id) {
                self.categories.upsert(&parent).await?;
            }
        }
        Ok(())
    }
}
