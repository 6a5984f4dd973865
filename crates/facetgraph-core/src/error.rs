//! Error types for Facetgraph

use thiserror::Error;

/// Result type alias using Facetgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Facetgraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Lookup errors (E001-E099)
    #[error("{kind} '{id}' not found.")]
    NotFound { kind: &'static str, id: String },

    // Validation errors (E100-E199)
    #[error("{kind} name '{name}' is already in use.")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Category must have parent. (category '{0}')")]
    CategoryMustHaveParent(String),

    #[error("Facet '{facet}' already has a property named '{property}'.")]
    DuplicateProperty { facet: String, property: String },

    #[error("Value '{raw}' can't be assigned to property '{property}' of type {expected}.")]
    IncompatibleValue {
        property: String,
        expected: &'static str,
        raw: String,
    },

    // Referential integrity errors (E200-E299)
    #[error("Entity '{entity}' is still referenced by {relationships} relationship(s).")]
    EntityInUse { entity: String, relationships: usize },

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl Error {
    /// Build a not-found error for an aggregate kind
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether this is a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Translate a store write failure, mapping unique index violations
    /// to [`Error::DuplicateName`]
    pub(crate) fn from_write(err: sqlx::Error, kind: &'static str, name: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::DuplicateName {
                kind,
                name: name.to_string(),
            },
            _ => Self::Database(err),
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "E001",
            Self::DuplicateName { .. } => "E100",
            Self::CategoryMustHaveParent(_) => "E101",
            Self::DuplicateProperty { .. } => "E102",
            Self::IncompatibleValue { .. } => "E103",
            Self::EntityInUse { .. } => "E200",
            Self::Database(_) => "E400",
            Self::Serialization(_) => "E401",
            Self::InvalidDocument(_) => "E402",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::DuplicateName { kind, .. } => {
                Some(format!("Pick a different {} name", kind.to_lowercase()))
            }
            Self::CategoryMustHaveParent(_) => {
                Some("Attach the category to a parent before saving it".to_string())
            }
            Self::EntityInUse { .. } => {
                Some("Delete the relationships that reference the entity first".to_string())
            }
            Self::IncompatibleValue { expected, .. } => {
                Some(format!("Provide a value that parses as {}", expected))
            }
            _ => None,
        }
    }
}
