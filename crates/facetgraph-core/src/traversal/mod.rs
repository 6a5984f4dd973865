//! Recursive category tree operations
//!
//! The traversers walk a category subtree directly through the category
//! and entity repositories. They are invoked by callers, not driven by the
//! change bus, although the entity writes they perform do publish.

mod copy;
mod removal;

pub use copy::CategoryCopyTraverser;
pub use removal::CategoryRemovalTraverser;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::bus::MessageBus;
    use crate::domain::Category;
    use crate::repository::{CategoryRepository, EntityRepository, Repository, TagRepository};
    use crate::storage::Database;

    pub struct Fixture {
        pub db: Database,
        pub tags: TagRepository,
        pub categories: CategoryRepository,
        pub entities: EntityRepository,
    }

    pub async fn setup() -> Fixture {
        let db = Database::in_memory().await.expect("Failed to create database");
        let bus = MessageBus::new();
        let tags = TagRepository::new(db.pool().clone(), bus.tags().clone());
        let entities =
            EntityRepository::new(db.pool().clone(), tags.clone(), bus.entities().clone());
        let categories = CategoryRepository::new(db.pool().clone());
        Fixture {
            db,
            tags,
            categories,
            entities,
        }
    }

    /// Create and save `name` below `parent`, saving the parent too
    pub async fn child_of(
        categories: &CategoryRepository,
        parent: &mut Category,
        name: &str,
    ) -> Category {
        let mut child = Category::new(name);
        parent.add_sub_category(&mut child);
        categories.upsert(&child).await.unwrap();
        categories.upsert(parent).await.unwrap();
        child
    }
}
