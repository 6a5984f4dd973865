//! Model facade
//!
//! Bundles one database, one [`MessageBus`] and everything wired to them.
//! Repositories built from the same `Model` share the bus, so queries and
//! controllers created here observe every write made through it.

use tracing::debug;

use crate::bus::MessageBus;
use crate::controller::{ModelCallbacks, ModelController, TrackingModelController};
use crate::domain::{Entity, Facet, Tag, Tagged};
use crate::error::Result;
use crate::query::{MultiTagQuery, QueryCallbacks, TagQuery};
use crate::repository::{
    CategoryRepository, EntityRepository, RelationshipRepository, Repository, TagRepository,
};
use crate::storage::{Database, DatabaseConfig};
use crate::traversal::{CategoryCopyTraverser, CategoryRemovalTraverser};

/// A knowledge graph opened on one database
#[derive(Clone)]
pub struct Model {
    db: Database,
    bus: MessageBus,
    tags: TagRepository,
    entities: EntityRepository,
    relationships: RelationshipRepository,
    categories: CategoryRepository,
}

impl Model {
    /// Open (and migrate, unless disabled) the database described by `config`
    pub async fn open(config: DatabaseConfig) -> anyhow::Result<Self> {
        let db = Database::new(config).await?;
        Ok(Self::from_database(db))
    }

    /// Open a transient in-memory model
    pub async fn in_memory() -> anyhow::Result<Self> {
        Self::open(DatabaseConfig::in_memory()).await
    }

    /// Wire repositories over an already opened database
    pub fn from_database(db: Database) -> Self {
        let bus = MessageBus::new();
        let pool = db.pool().clone();
        let tags = TagRepository::new(pool.clone(), bus.tags().clone());
        let entities = EntityRepository::new(pool.clone(), tags.clone(), bus.entities().clone());
        let relationships =
            RelationshipRepository::new(pool.clone(), tags.clone(), bus.relationships().clone());
        let categories = CategoryRepository::new(pool);
        debug!(path = %db.path().display(), "Model opened");

        Self {
            db,
            bus,
            tags,
            entities,
            relationships,
            categories,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn tags(&self) -> &TagRepository {
        &self.tags
    }

    pub fn entities(&self) -> &EntityRepository {
        &self.entities
    }

    pub fn relationships(&self) -> &RelationshipRepository {
        &self.relationships
    }

    pub fn categories(&self) -> &CategoryRepository {
        &self.categories
    }

    pub fn copy_traverser(&self) -> CategoryCopyTraverser {
        CategoryCopyTraverser::new(self.categories.clone(), self.entities.clone())
    }

    pub fn removal_traverser(&self) -> CategoryRemovalTraverser {
        CategoryRemovalTraverser::new(self.categories.clone(), self.entities.clone())
    }

    /// Start a live query over one tag
    pub async fn tag_query(&self, tag: Tag, callbacks: QueryCallbacks) -> Result<TagQuery> {
        TagQuery::new(tag, &self.entities, &self.relationships, callbacks).await
    }

    /// Create an empty union query; add tags to populate it
    pub fn multi_tag_query(&self, callbacks: QueryCallbacks) -> MultiTagQuery {
        MultiTagQuery::new(&self.entities, &self.relationships, callbacks)
    }

    pub fn controller(&self, callbacks: ModelCallbacks) -> ModelController {
        ModelController::new(&self.bus, callbacks)
    }

    pub fn tracking_controller(&self, callbacks: ModelCallbacks) -> TrackingModelController {
        TrackingModelController::new(&self.bus, callbacks)
    }

    /// Every facet applying to an entity: its tags' facets, then the facets
    /// of its category and that category's ancestors
    pub async fn entity_facets(&self, entity: &Entity) -> Result<Vec<Facet>> {
        let chain = match entity.category {
            Some(id) => {
                let category = self.categories.find_by_id(id).await?;
                self.categories.ancestry(&category).await?
            }
            None => Vec::new(),
        };
        Ok(entity.facets(&chain).into_iter().cloned().collect())
    }

    /// Unassign a tag from every entity and relationship, then delete it
    ///
    /// The tag repository does not cascade, so deleting a tag directly would
    /// leave dangling references behind.
    pub async fn delete_tag(&self, tag: &Tag) -> Result<bool> {
        let mut detached = 0;
        for mut entity in self.entities.find_by_tag(tag.id).await? {
            entity.remove_tag(tag.id);
            self.entities.upsert(&entity).await?;
            detached += 1;
        }
        for mut relationship in self.relationships.find_by_tag(tag.id).await? {
            relationship.remove_tag(tag.id);
            self.relationships.upsert(&relationship).await?;
            detached += 1;
        }
        debug!(tag_id = %tag.id, detached, "Tag assignments removed");
        self.tags.delete(tag).await
    }

    /// Close the underlying connection pool
    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, FacetProperty, PropertyType, Relationship};

    #[tokio::test]
    async fn test_model_shares_one_bus() {
        let model = Model::in_memory().await.unwrap();
        let tag = model.tags().upsert(&Tag::new("person")).await.unwrap();
        let query = model
            .tag_query(tag.clone(), QueryCallbacks::new())
            .await
            .unwrap();

        let entity = Entity::new("ada").with_tag(tag);
        model.entities().upsert(&entity).await.unwrap();

        assert!(query.contains_entity(entity.id));
    }

    #[tokio::test]
    async fn test_entity_facets_follow_ancestry() {
        let model = Model::in_memory().await.unwrap();
        let mut tag = Tag::new("person");
        tag.facet_mut()
            .add_property(FacetProperty::new("born", PropertyType::DateTime))
            .unwrap();
        let tag = model.tags().upsert(&tag).await.unwrap();

        let mut root = model.categories().root().await.unwrap();
        let mut people = Category::new("people");
        root.add_sub_category(&mut people);
        model.categories().upsert(&people).await.unwrap();
        model.categories().upsert(&root).await.unwrap();

        let mut entity = Entity::new("ada").with_category(people.id);
        entity.add_tag(tag.clone());
        model.entities().upsert(&entity).await.unwrap();

        let facets = model.entity_facets(&entity).await.unwrap();
        let names: Vec<&str> = facets.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["person", "people", "root"]);
    }

    #[tokio::test]
    async fn test_delete_tag_detaches_assignments() {
        let model = Model::in_memory().await.unwrap();
        let mut tag = Tag::new("draft");
        let note = tag
            .facet_mut()
            .add_property(FacetProperty::new("note", PropertyType::String))
            .unwrap()
            .clone();
        let tag = model.tags().upsert(&tag).await.unwrap();
        let keep = model.tags().upsert(&Tag::new("keep")).await.unwrap();

        let mut a = Entity::new("a").with_tag(tag.clone()).with_tag(keep.clone());
        a.set_facet_property(&note, Some("todo")).unwrap();
        let b = Entity::new("b");
        model.entities().upsert(&a).await.unwrap();
        model.entities().upsert(&b).await.unwrap();
        let link = Relationship::new("cites", &a, &b).with_tag(tag.clone());
        model.relationships().upsert(&link).await.unwrap();

        let query = model.tag_query(tag.clone(), QueryCallbacks::new()).await.unwrap();
        assert!(model.delete_tag(&tag).await.unwrap());

        assert!(model.tags().find_optional(tag.id).await.unwrap().is_none());
        assert!(model.entities().find_by_tag(tag.id).await.unwrap().is_empty());
        assert!(model.relationships().find_by_tag(tag.id).await.unwrap().is_empty());
        assert!(!query.contains_entity(a.id));
        assert!(!query.contains_relationship(link.id));

        let a = model.entities().find_by_id(a.id).await.unwrap();
        assert_eq!(a.tags, vec![keep]);
        assert!(a.facet_value(note.id).is_none());
    }

    #[tokio::test]
    async fn test_uncategorized_entity_has_only_tag_facets() {
        let model = Model::in_memory().await.unwrap();
        let tag = model.tags().upsert(&Tag::new("topic")).await.unwrap();
        let entity = Entity::new("rust").with_tag(tag);

        let facets = model.entity_facets(&entity).await.unwrap();
        assert_eq!(facets.len(), 1);
        assert_eq!(facets[0].name, "topic");
    }
}
