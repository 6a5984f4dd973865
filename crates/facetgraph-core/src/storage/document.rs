//! Stored document shapes
//!
//! Each collection row keeps its aggregate as a JSON document. Documents
//! point at other aggregates through [`DocumentRef`] objects of the form
//! `{"$ref": "<collection>", "$id": "<id>"}` and never embed them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{
    Category, CategoryId, Entity, EntityId, Facet, Relationship, RelationshipId, Tag, TagId,
    Values,
};
use crate::error::{Error, Result};

pub const TAGS: &str = "tags";
pub const ENTITIES: &str = "entities";
pub const RELATIONSHIPS: &str = "relationships";
pub const CATEGORIES: &str = "categories";

/// Reference from one document to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    #[serde(rename = "$ref")]
    pub collection: String,
    #[serde(rename = "$id")]
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: &str, id: impl ToString) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// Parse the referenced id, checking the target collection
    pub fn resolve_id<I: FromStr>(&self, collection: &str) -> Result<I> {
        if self.collection != collection {
            return Err(Error::InvalidDocument(format!(
                "expected a reference into '{}', found '{}'",
                collection, self.collection
            )));
        }
        self.id
            .parse()
            .map_err(|_| Error::InvalidDocument(format!("malformed reference id '{}'", self.id)))
    }
}

/// A raw collection row
#[derive(Debug, FromRow)]
pub(crate) struct DocumentRow {
    pub id: String,
    pub document: String,
}

impl DocumentRow {
    /// Deserialize the document, checking it belongs to this row
    pub fn decode<D: Document>(&self) -> Result<D> {
        let document: D = serde_json::from_str(&self.document)?;
        let key = document.key();
        if key != self.id {
            return Err(Error::InvalidDocument(format!(
                "row '{}' holds the document of '{}'",
                self.id, key
            )));
        }
        Ok(document)
    }
}

/// A document stored under its own `_id`
pub(crate) trait Document: for<'de> Deserialize<'de> {
    /// The `_id` as written to the row's id column
    fn key(&self) -> String;
}

/// Parse an id column back into its newtype
pub(crate) fn parse_id<I: FromStr>(raw: &str) -> Result<I> {
    raw.parse()
        .map_err(|_| Error::InvalidDocument(format!("malformed id '{}'", raw)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDocument {
    #[serde(rename = "_id")]
    pub id: TagId,
    pub name: String,
    pub facet: Facet,
}

impl Document for TagDocument {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl From<&Tag> for TagDocument {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
            facet: tag.facet.clone(),
        }
    }
}

impl From<TagDocument> for Tag {
    fn from(doc: TagDocument) -> Self {
        Tag {
            id: doc.id,
            name: doc.name,
            facet: doc.facet,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDocument {
    #[serde(rename = "_id")]
    pub id: CategoryId,
    pub name: String,
    pub parent: Option<DocumentRef>,
    #[serde(default)]
    pub sub_categories: Vec<DocumentRef>,
    pub facet: Facet,
}

impl Document for CategoryDocument {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl From<&Category> for CategoryDocument {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            parent: category.parent.map(|p| DocumentRef::new(CATEGORIES, p)),
            sub_categories: category
                .sub_categories()
                .iter()
                .map(|c| DocumentRef::new(CATEGORIES, c))
                .collect(),
            facet: category.facet.clone(),
        }
    }
}

impl CategoryDocument {
    pub fn into_category(self) -> Result<Category> {
        let parent = self
            .parent
            .map(|p| p.resolve_id::<CategoryId>(CATEGORIES))
            .transpose()?;
        let sub_categories = self
            .sub_categories
            .iter()
            .map(|c| c.resolve_id::<CategoryId>(CATEGORIES))
            .collect::<Result<Vec<_>>>()?;
        Ok(Category::restore(
            self.id,
            self.name,
            parent,
            sub_categories,
            self.facet,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDocument {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    pub category: Option<DocumentRef>,
    #[serde(default)]
    pub tags: Vec<DocumentRef>,
    #[serde(default)]
    pub values: Values,
}

impl Document for EntityDocument {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl From<&Entity> for EntityDocument {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            name: entity.name.clone(),
            category: entity.category.map(|c| DocumentRef::new(CATEGORIES, c)),
            tags: tag_refs(&entity.tags),
            values: entity.values.clone(),
        }
    }
}

impl EntityDocument {
    pub fn category_id(&self) -> Result<Option<CategoryId>> {
        self.category
            .as_ref()
            .map(|c| c.resolve_id(CATEGORIES))
            .transpose()
    }

    pub fn tag_ids(&self) -> Result<Vec<TagId>> {
        self.tags.iter().map(|t| t.resolve_id(TAGS)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDocument {
    #[serde(rename = "_id")]
    pub id: RelationshipId,
    pub name: String,
    pub from: DocumentRef,
    pub to: DocumentRef,
    #[serde(default)]
    pub tags: Vec<DocumentRef>,
    #[serde(default)]
    pub values: Values,
}

impl Document for RelationshipDocument {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl From<&Relationship> for RelationshipDocument {
    fn from(relationship: &Relationship) -> Self {
        Self {
            id: relationship.id,
            name: relationship.name.clone(),
            from: DocumentRef::new(ENTITIES, relationship.from),
            to: DocumentRef::new(ENTITIES, relationship.to),
            tags: tag_refs(&relationship.tags),
            values: relationship.values.clone(),
        }
    }
}

impl RelationshipDocument {
    pub fn endpoints(&self) -> Result<(EntityId, EntityId)> {
        Ok((self.from.resolve_id(ENTITIES)?, self.to.resolve_id(ENTITIES)?))
    }

    pub fn tag_ids(&self) -> Result<Vec<TagId>> {
        self.tags.iter().map(|t| t.resolve_id(TAGS)).collect()
    }
}

fn tag_refs(tags: &[Tag]) -> Vec<DocumentRef> {
    tags.iter().map(|t| DocumentRef::new(TAGS, t.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FacetProperty, PropertyType, Tagged};

    #[test]
    fn test_entity_document_stores_references() {
        let mut tag = Tag::new("person");
        let prop = tag
            .facet_mut()
            .add_property(FacetProperty::new("age", PropertyType::Long))
            .unwrap()
            .clone();
        let category = CategoryId::new();
        let mut entity = Entity::new("alice").with_category(category).with_tag(tag.clone());
        entity.set_facet_property(&prop, Some("42")).unwrap();

        let json = serde_json::to_value(EntityDocument::from(&entity)).unwrap();
        assert_eq!(json["_id"], entity.id.to_string());
        assert_eq!(json["category"]["$ref"], "categories");
        assert_eq!(json["category"]["$id"], category.to_string());
        assert_eq!(json["tags"][0]["$ref"], "tags");
        assert_eq!(json["tags"][0]["$id"], tag.id.to_string());
        // Only the reference is stored, not the tag's facet
        assert!(json["tags"][0].get("facet").is_none());
        assert_eq!(json["values"][prop.id.to_string()]["value"], 42);
    }

    #[test]
    fn test_decode_rejects_document_under_foreign_id() {
        let tag = Tag::new("person");
        let document = serde_json::to_string(&TagDocument::from(&tag)).unwrap();

        let row = DocumentRow {
            id: tag.id.to_string(),
            document: document.clone(),
        };
        assert_eq!(Tag::from(row.decode::<TagDocument>().unwrap()), tag);

        let row = DocumentRow {
            id: TagId::new().to_string(),
            document,
        };
        assert!(matches!(
            row.decode::<TagDocument>(),
            Err(Error::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_category_document_restores_tree_links() {
        let mut parent = Category::new("parent");
        let mut child = Category::new("child");
        parent.add_sub_category(&mut child);

        let doc = CategoryDocument::from(&parent);
        let restored = doc.into_category().unwrap();
        assert_eq!(restored, parent);

        let doc = CategoryDocument::from(&child);
        assert_eq!(doc.into_category().unwrap().parent, Some(parent.id));
    }

    #[test]
    fn test_reference_into_wrong_collection_rejected() {
        let r = DocumentRef::new(TAGS, TagId::new());
        let err = r.resolve_id::<EntityId>(ENTITIES).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument(_)));
    }

    #[test]
    fn test_relationship_endpoints() {
        let a = Entity::new("a");
        let b = Entity::new("b");
        let rel = Relationship::new("knows", &a, &b);
        let doc = RelationshipDocument::from(&rel);
        assert_eq!(doc.endpoints().unwrap(), (a.id, b.id));
        assert!(doc.tag_ids().unwrap().is_empty());
    }
}
