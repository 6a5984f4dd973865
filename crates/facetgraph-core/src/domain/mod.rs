//! Domain layer
//!
//! Contains the aggregates of the knowledge graph and their invariants:
//!
//! - **Tag**: a globally named label carrying a [`Facet`]
//! - **Category**: a node of the category tree, also carrying a facet
//! - **Entity**: a graph node filed under a category and tagged
//! - **Relationship**: a directed, tagged edge between two entities
//!
//! Aggregates are created in memory with a fresh id and mutated freely.
//! They only gain persistent identity once a repository upserts them.

mod category;
mod entity;
mod facet;
mod ids;
mod relationship;
mod tag;
mod value;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::hash::Hash;

use crate::error::Result;

pub use category::{Category, ROOT_CATEGORY_NAME};
pub use entity::Entity;
pub use facet::{Facet, FacetProperty};
pub use ids::{CategoryId, EntityId, PropertyId, RelationshipId, TagId};
pub use relationship::Relationship;
pub use tag::Tag;
pub use value::{PropertyType, Value};

/// Facet values keyed by property id
pub type Values = BTreeMap<PropertyId, Value>;

/// Common surface of every persisted aggregate
pub trait Aggregate: Clone + Send + Sync + 'static {
    /// Identifier type of the aggregate
    type Id: Copy + Eq + Hash + Display + Send + Sync + 'static;

    /// Human-readable aggregate kind, used in errors and logs
    const KIND: &'static str;

    fn id(&self) -> Self::Id;

    fn name(&self) -> &str;
}

/// Aggregates that carry tags and facet values
///
/// Entities and relationships share the same tagging rules: tags form a
/// set, and removing a tag purges the values of that tag's facet.
pub trait Tagged: Aggregate {
    fn tags(&self) -> &[Tag];

    fn tags_mut(&mut self) -> &mut Vec<Tag>;

    fn values(&self) -> &Values;

    fn values_mut(&mut self) -> &mut Values;

    /// Whether the tag with this id is assigned
    fn has_tag(&self, tag: TagId) -> bool {
        self.tags().iter().any(|t| t.id == tag)
    }

    /// Assign a tag; returns false if it was already assigned
    fn add_tag(&mut self, tag: Tag) -> bool {
        if self.has_tag(tag.id) {
            return false;
        }
        self.tags_mut().push(tag);
        true
    }

    /// Unassign a tag and drop the values of its facet properties
    fn remove_tag(&mut self, tag: TagId) -> bool {
        let Some(pos) = self.tags().iter().position(|t| t.id == tag) else {
            return false;
        };
        let removed = self.tags_mut().remove(pos);
        let values = self.values_mut();
        for property in removed.facet.properties() {
            values.remove(&property.id);
        }
        true
    }

    /// Assign a raw value to a facet property
    ///
    /// `None` clears the value. A string that does not parse as the
    /// property's type fails with `Error::IncompatibleValue`.
    fn set_facet_property(&mut self, property: &FacetProperty, raw: Option<&str>) -> Result<()> {
        match raw {
            None => {
                self.values_mut().remove(&property.id);
            }
            Some(raw) => {
                let value = property.parse_value(raw)?;
                self.values_mut().insert(property.id, value);
            }
        }
        Ok(())
    }

    /// Assign an already typed value to a facet property
    fn set_facet_value(&mut self, property: &FacetProperty, value: Value) -> Result<()> {
        if !property.accepts(&value) {
            return Err(crate::Error::IncompatibleValue {
                property: property.name.clone(),
                expected: property.property_type.as_str(),
                raw: value.to_string(),
            });
        }
        self.values_mut().insert(property.id, value);
        Ok(())
    }

    /// Current value of a facet property
    fn facet_value(&self, property: PropertyId) -> Option<&Value> {
        self.values().get(&property)
    }
}
