//! Facets: named schemas of typed properties
//!
//! A [`Facet`] is owned by exactly one [`Tag`](super::Tag) or
//! [`Category`](super::Category). Its properties describe the values an
//! entity or relationship may carry once the owner applies to it.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::ids::PropertyId;
use super::value::{PropertyType, Value};

/// One typed, named slot of a facet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetProperty {
    pub id: PropertyId,
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
}

impl FacetProperty {
    /// Create a new property with a fresh id
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id: PropertyId::new(),
            name: name.into(),
            property_type,
        }
    }

    /// Whether a raw value may be assigned to this property
    ///
    /// `None` is always assignable; strings must parse as the declared type.
    pub fn can_assign_value(&self, raw: Option<&str>) -> bool {
        match raw {
            None => true,
            Some(raw) => self.property_type.parse_value(raw).is_some(),
        }
    }

    /// Whether an already typed value matches the declared type and can be stored
    pub fn accepts(&self, value: &Value) -> bool {
        value.property_type() == self.property_type && value.is_storable()
    }

    /// Parse a raw value, failing with [`Error::IncompatibleValue`]
    pub fn parse_value(&self, raw: &str) -> Result<Value> {
        self.property_type
            .parse_value(raw)
            .ok_or_else(|| Error::IncompatibleValue {
                property: self.name.clone(),
                expected: self.property_type.as_str(),
                raw: raw.to_string(),
            })
    }
}

/// A named set of typed properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub name: String,
    properties: Vec<FacetProperty>,
}

impl Facet {
    /// Create an empty facet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Properties in insertion order
    pub fn properties(&self) -> &[FacetProperty] {
        &self.properties
    }

    /// Add a property; names are unique (case-sensitive) within a facet
    pub fn add_property(&mut self, property: FacetProperty) -> Result<&FacetProperty> {
        if self.property_by_name(&property.name).is_some() {
            return Err(Error::DuplicateProperty {
                facet: self.name.clone(),
                property: property.name,
            });
        }
        self.properties.push(property);
        Ok(&self.properties[self.properties.len() - 1])
    }

    /// Remove a property by id, returning whether it existed
    pub fn remove_property(&mut self, id: PropertyId) -> bool {
        let before = self.properties.len();
        self.properties.retain(|p| p.id != id);
        self.properties.len() != before
    }

    /// Look up a property by id
    pub fn property(&self, id: PropertyId) -> Option<&FacetProperty> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// Look up a property by name
    pub fn property_by_name(&self, name: &str) -> Option<&FacetProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up a property by name for editing
    pub fn property_by_name_mut(&mut self, name: &str) -> Option<&mut FacetProperty> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    /// Whether the facet declares this property id
    pub fn contains(&self, id: PropertyId) -> bool {
        self.property(id).is_some()
    }
}
