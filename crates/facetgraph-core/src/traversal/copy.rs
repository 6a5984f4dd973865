//! Recursive category copy

use std::collections::HashSet;

use futures_util::future::BoxFuture;
use tracing::{debug, info};

use crate::domain::{Category, CategoryId};
use crate::error::Result;
use crate::repository::{CategoryRepository, EntityRepository, Repository};

/// Deep-copies a category subtree below another category
#[derive(Clone)]
pub struct CategoryCopyTraverser {
    categories: CategoryRepository,
    entities: EntityRepository,
}

impl CategoryCopyTraverser {
    pub fn new(categories: CategoryRepository, entities: EntityRepository) -> Self {
        Self {
            categories,
            entities,
        }
    }

    /// Copy `src` with all its sub-categories and entities below `dst`
    ///
    /// Every copied category and entity gets a fresh id and keeps its name,
    /// facet, tags and values. The source tree is not modified. Returns the
    /// new top-level copy.
    pub async fn copy_category(&self, src: &Category, dst: &Category) -> Result<Category> {
        let mut created = HashSet::new();
        let copy = self.copy_into(src.id, dst.id, &mut created).await?;
        info!(
            source = %src.id,
            destination = %dst.id,
            categories = created.len(),
            "Category copied"
        );
        Ok(copy)
    }

    fn copy_into<'a>(
        &'a self,
        src: CategoryId,
        dst: CategoryId,
        created: &'a mut HashSet<CategoryId>,
    ) -> BoxFuture<'a, Result<Category>> {
        Box::pin(async move {
            let source = self.categories.find_by_id(src).await?;
            // Snapshot before attaching so copying into the own subtree terminates
            let children = self.categories.sub_categories(src).await?;
            let entities = self.entities.find_by_category(Some(src)).await?;

            let mut parent = self.categories.find_by_id(dst).await?;
            let mut copy = Category::new(source.name.clone());
            copy.facet = source.facet.clone();
            parent.add_sub_category(&mut copy);
            self.categories.upsert(&copy).await?;
            self.categories.upsert(&parent).await?;
            created.insert(copy.id);
            debug!(source = %src, copy = %copy.id, "Category node copied");

            for entity in &entities {
                let mut duplicate = entity.duplicate();
                duplicate.category = Some(copy.id);
                self.entities.upsert(&duplicate).await?;
            }

            for child in &children {
                if !created.contains(&child.id) {
                    self.copy_into(child.id, copy.id, created).await?;
                }
            }

            // Sub-category list changed while recursing
            self.categories.find_by_id(copy.id).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entity, FacetProperty, PropertyType, Tag, Tagged};
    use crate::traversal::test_support::{child_of, setup};

    #[tokio::test]
    async fn test_copy_fidelity() {
        let f = setup().await;
        let traverser = CategoryCopyTraverser::new(f.categories.clone(), f.entities.clone());

        let mut root = f.categories.root().await.unwrap();
        let mut src = child_of(&f.categories, &mut root, "src").await;
        let dst = child_of(&f.categories, &mut root, "dst").await;
        let nested = child_of(&f.categories, &mut src, "nested").await;

        let mut tag = Tag::new("t1");
        let prop = tag
            .facet_mut()
            .add_property(FacetProperty::new("size", PropertyType::Long))
            .unwrap()
            .clone();
        f.tags.upsert(&tag).await.unwrap();
        let mut e1 = Entity::new("e1").with_category(src.id).with_tag(tag.clone());
        e1.set_facet_property(&prop, Some("3")).unwrap();
        f.entities.upsert(&e1).await.unwrap();
        let e2 = Entity::new("e2").with_category(nested.id);
        f.entities.upsert(&e2).await.unwrap();

        let src_before = f.categories.find_by_id(src.id).await.unwrap();
        let copy = traverser.copy_category(&src, &dst).await.unwrap();

        assert_ne!(copy.id, src.id);
        assert_eq!(copy.name, "src");
        assert_eq!(copy.parent, Some(dst.id));

        let dst_children = f.categories.sub_categories(dst.id).await.unwrap();
        assert_eq!(dst_children.len(), 1);
        assert_eq!(dst_children[0].id, copy.id);
        let dst_after = f.categories.find_by_id(dst.id).await.unwrap();
        assert_eq!(dst_after.sub_categories(), &[copy.id]);

        let copied = f.entities.find_by_category(Some(copy.id)).await.unwrap();
        assert_eq!(copied.len(), 1);
        assert_ne!(copied[0].id, e1.id);
        assert_eq!(copied[0].name, e1.name);
        assert_eq!(copied[0].tags, e1.tags);
        assert_eq!(copied[0].values, e1.values);

        let copy_children = f.categories.sub_categories(copy.id).await.unwrap();
        assert_eq!(copy_children.len(), 1);
        assert_eq!(copy_children[0].name, "nested");
        assert_ne!(copy_children[0].id, nested.id);
        let nested_copies = f
            .entities
            .find_by_category(Some(copy_children[0].id))
            .await
            .unwrap();
        assert_eq!(nested_copies.len(), 1);
        assert_eq!(nested_copies[0].name, "e2");

        // Source is untouched
        assert_eq!(f.categories.find_by_id(src.id).await.unwrap(), src_before);
        assert_eq!(
            f.entities.find_by_category(Some(src.id)).await.unwrap(),
            vec![e1]
        );
        assert_eq!(f.categories.sub_categories(src.id).await.unwrap(), vec![nested]);
    }

    #[tokio::test]
    async fn test_copy_into_own_subtree_terminates() {
        let f = setup().await;
        let traverser = CategoryCopyTraverser::new(f.categories.clone(), f.entities.clone());

        let mut root = f.categories.root().await.unwrap();
        let mut src = child_of(&f.categories, &mut root, "src").await;
        let inner = child_of(&f.categories, &mut src, "inner").await;

        let copy = traverser.copy_category(&src, &inner).await.unwrap();
        assert_eq!(copy.parent, Some(inner.id));

        let copied_children = f.categories.sub_categories(copy.id).await.unwrap();
        assert_eq!(copied_children.len(), 1);
        assert_eq!(copied_children[0].name, "inner");
        assert!(f
            .categories
            .sub_categories(copied_children[0].id)
            .await
            .unwrap()
            .is_empty());
    }
}
