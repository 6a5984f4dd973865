//! Live tag queries
//!
//! A [`TagQuery`] follows the entity and relationship buses and keeps the
//! set of items that currently carry one tag. A [`MultiTagQuery`] combines
//! several of them into a de-duplicated union. Both report membership
//! edges through [`QueryCallbacks`].

mod callbacks;
mod multi_tag_query;
mod tag_query;

pub use callbacks::{AggregateCallbacks, Callback, QueryCallbacks};
pub use multi_tag_query::MultiTagQuery;
pub use tag_query::TagQuery;

pub(crate) use callbacks::{Transition, fire};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use super::{AggregateCallbacks, QueryCallbacks};
    use crate::bus::MessageBus;
    use crate::domain::Aggregate;
    use crate::repository::{EntityRepository, RelationshipRepository, TagRepository};
    use crate::storage::Database;

    pub struct Fixture {
        pub _db: Database,
        pub tags: TagRepository,
        pub entities: EntityRepository,
        pub relationships: RelationshipRepository,
    }

    pub async fn setup() -> Fixture {
        let db = Database::in_memory().await.expect("Failed to create database");
        let bus = MessageBus::new();
        let tags = TagRepository::new(db.pool().clone(), bus.tags().clone());
        let entities =
            EntityRepository::new(db.pool().clone(), tags.clone(), bus.entities().clone());
        let relationships = RelationshipRepository::new(
            db.pool().clone(),
            tags.clone(),
            bus.relationships().clone(),
        );
        Fixture {
            _db: db,
            tags,
            entities,
            relationships,
        }
    }

    /// Collects callback invocations as `"<kind> <edge> <name>"` lines
    #[derive(Clone, Default)]
    pub struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }

        pub fn aggregate<T: Aggregate>(&self, kind: &'static str) -> AggregateCallbacks<T> {
            let line = |edge: &'static str| {
                let log = Arc::clone(&self.log);
                move |item: &T| {
                    log.lock()
                        .unwrap()
                        .push(format!("{} {} {}", kind, edge, item.name()))
                }
            };
            AggregateCallbacks::new()
                .on_added(line("added"))
                .on_changed(line("changed"))
                .on_removed(line("removed"))
        }

        pub fn callbacks(&self) -> QueryCallbacks {
            QueryCallbacks::new()
                .with_entities(self.aggregate("entity"))
                .with_relationships(self.aggregate("relationship"))
        }
    }
}
