//! Relationships: directed, tagged edges between entities

use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::ids::{EntityId, RelationshipId};
use super::tag::Tag;
use super::{Aggregate, Tagged, Values};

/// A directed edge from one entity to another
///
/// Both endpoints are mandatory. A relationship never outlives either
/// endpoint: the entity repository refuses to delete a referenced entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub name: String,
    pub from: EntityId,
    pub to: EntityId,
    pub tags: Vec<Tag>,
    pub values: Values,
}

impl Relationship {
    /// Create a relationship between two entities
    pub fn new(name: impl Into<String>, from: &Entity, to: &Entity) -> Self {
        Self {
            id: RelationshipId::new(),
            name: name.into(),
            from: from.id,
            to: to.id,
            tags: Vec::new(),
            values: Values::new(),
        }
    }

    /// Assign a tag, builder style
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.add_tag(tag);
        self
    }

    /// Whether the entity is either endpoint
    pub fn connects(&self, entity: EntityId) -> bool {
        self.from == entity || self.to == entity
    }
}

impl Aggregate for Relationship {
    type Id = RelationshipId;
    const KIND: &'static str = "Relationship";

    fn id(&self) -> RelationshipId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Tagged for Relationship {
    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut Vec<Tag> {
        &mut self.tags
    }

    fn values(&self) -> &Values {
        &self.values
    }

    fn values_mut(&mut self) -> &mut Values {
        &mut self.values
    }
}
