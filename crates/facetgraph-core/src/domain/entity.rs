//! Entities: the nodes of the knowledge graph

use serde::{Deserialize, Serialize};

use super::category::Category;
use super::facet::Facet;
use super::ids::{CategoryId, EntityId};
use super::tag::Tag;
use super::{Aggregate, Tagged, Values};

/// A node of the graph
///
/// An entity is filed under at most one category and carries any number
/// of tags. Its values are keyed by the ids of the properties declared by
/// those tags' facets (or its category chain's facets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub category: Option<CategoryId>,
    pub tags: Vec<Tag>,
    pub values: Values,
}

impl Entity {
    /// Create an uncategorized, untagged entity
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            category: None,
            tags: Vec::new(),
            values: Values::new(),
        }
    }

    /// File the entity under a category
    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }

    /// Assign a tag, builder style
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.add_tag(tag);
        self
    }

    /// Copy of this entity under a fresh id
    pub fn duplicate(&self) -> Self {
        Self {
            id: EntityId::new(),
            ..self.clone()
        }
    }

    /// All facets applying to this entity
    ///
    /// Tag facets come first, then the facets of `category_chain` (the
    /// entity's category followed by its ancestors). Each facet appears
    /// once.
    pub fn facets<'a>(&'a self, category_chain: &'a [Category]) -> Vec<&'a Facet> {
        let mut facets: Vec<&Facet> = Vec::new();
        let candidates = self
            .tags
            .iter()
            .map(|t| &t.facet)
            .chain(category_chain.iter().map(|c| &c.facet));
        for facet in candidates {
            if !facets.iter().any(|f| std::ptr::eq(*f, facet)) {
                facets.push(facet);
            }
        }
        facets
    }
}

impl Aggregate for Entity {
    type Id = EntityId;
    const KIND: &'static str = "Entity";

    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Tagged for Entity {
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
