//! Storage layer for facetgraph
//!
//! Provides the SQLite database connection pool, schema migrations, and
//! the JSON document shapes each collection stores.

pub mod database;
pub mod document;
pub mod migrations;

pub use database::{Database, DatabaseConfig};
pub use document::DocumentRef;
pub use migrations::MigrationStatus;
