//! Facetgraph Core Library
//!
//! This crate provides the core functionality for Facetgraph, a personal
//! knowledge graph of tagged entities and relationships filed into a
//! category tree:
//! - Domain aggregates (tags, categories, entities, relationships, facets)
//! - Storage (SQLite document collections with versioned migrations)
//! - Repositories with referential integrity
//! - Change bus publishing every successful write
//! - Category copy and removal traversers
//! - Live tag queries and model controllers
//! - File-based configuration

pub mod bus;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod model;
pub mod query;
pub mod repository;
pub mod storage;
pub mod traversal;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bus::{ChangeKind, ChangedMessage, MessageBus, Subscription};
    pub use crate::config::Config;
    pub use crate::controller::{ModelCallbacks, ModelController, TrackingModelController};
    pub use crate::domain::{
        Aggregate, Category, CategoryId, Entity, EntityId, Facet, FacetProperty, PropertyType,
        Relationship, RelationshipId, Tag, TagId, Tagged, Value,
    };
    pub use crate::error::{Error, Result};
    pub use crate::model::Model;
    pub use crate::query::{AggregateCallbacks, MultiTagQuery, QueryCallbacks, TagQuery};
    pub use crate::repository::Repository;
    pub use crate::storage::{Database, DatabaseConfig};
}
