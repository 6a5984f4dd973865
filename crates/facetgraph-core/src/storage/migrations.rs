//! Database migrations
//!
//! This module manages the SQLite schema for facetgraph. Each aggregate kind
//! lives in its own collection table holding the JSON document, plus the
//! index columns projected from it on every write.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Document collections
const MIGRATION_V1: &str = r#"
    -- Tags: name is globally unique
    CREATE TABLE IF NOT EXISTS tags (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        document TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_name ON tags(name);

    -- Categories: sibling names are unique below one parent
    CREATE TABLE IF NOT EXISTS categories (
        id TEXT PRIMARY KEY NOT NULL,
        parent_id TEXT,
        name TEXT NOT NULL,
        document TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_parent_name
        ON categories(IFNULL(parent_id, ''), name);

    -- Entities: names are unique within a category scope
    CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY NOT NULL,
        category_id TEXT,
        name TEXT NOT NULL,
        document TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_category_name
        ON entities(IFNULL(category_id, ''), name);
    CREATE INDEX IF NOT EXISTS idx_entities_category_id ON entities(category_id);
    CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);

    -- Relationships: endpoints are indexed for the referential checks
    CREATE TABLE IF NOT EXISTS relationships (
        id TEXT PRIMARY KEY NOT NULL,
        from_id TEXT NOT NULL,
        to_id TEXT NOT NULL,
        name TEXT NOT NULL,
        document TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_relationships_from_id ON relationships(from_id);
    CREATE INDEX IF NOT EXISTS idx_relationships_to_id ON relationships(to_id);
"#;

/// Migration 2: Tag reference projections for index-backed tag lookups
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS entity_tags (
        entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        tag_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (entity_id, tag_id)
    );

    CREATE INDEX IF NOT EXISTS idx_entity_tags_tag_id ON entity_tags(tag_id);

    CREATE TABLE IF NOT EXISTS relationship_tags (
        relationship_id TEXT NOT NULL REFERENCES relationships(id) ON DELETE CASCADE,
        tag_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (relationship_id, tag_id)
    );

    CREATE INDEX IF NOT EXISTS idx_relationship_tags_tag_id ON relationship_tags(tag_id);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Document collections");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Tag reference projections");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    Ok(())
}

/// Check migration status
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}
