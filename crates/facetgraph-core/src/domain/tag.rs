//! Tags: globally named, schema-carrying labels

use serde::{Deserialize, Serialize};

use super::facet::Facet;
use super::ids::TagId;
use super::Aggregate;

/// A reusable label assignable to entities and relationships
///
/// Tags are referenced, never owned, by the items they are assigned to.
/// The name is globally unique; the tag repository enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub facet: Facet,
}

impl Tag {
    /// Create a tag with an empty facet of the same name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: TagId::new(),
            facet: Facet::new(name.clone()),
            name,
        }
    }

    /// Replace the facet
    pub fn with_facet(mut self, facet: Facet) -> Self {
        self.facet = facet;
        self
    }

    /// Edit the facet in place
    pub fn facet_mut(&mut self) -> &mut Facet {
        &mut self.facet
    }
}

impl Aggregate for Tag {
    type Id = TagId;
    const KIND: &'static str = "Tag";

    fn id(&self) -> TagId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FacetProperty, PropertyType};

    #[test]
    fn test_tag_creation() {
        let tag = Tag::new("person");
        assert_eq!(tag.name, "person");
        assert_eq!(tag.facet.name, "person");
        assert!(tag.facet.properties().is_empty());
        assert_ne!(tag.id, Tag::new("person").id);
    }

    #[test]
    fn test_tag_facet_editing() {
        let mut tag = Tag::new("book");
        tag.facet_mut()
            .add_property(FacetProperty::new("isbn", PropertyType::String))
            .unwrap();
        assert!(tag.facet.property_by_name("isbn").is_some());
    }
}
