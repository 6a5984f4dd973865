//! Identifier newtypes
//!
//! Every aggregate is keyed by a UUID. Wrapping each kind in its own type
//! keeps entity ids from being passed where a tag id is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Identifier of a [`Tag`](super::Tag)
    TagId
);
define_id!(
    /// Identifier of an [`Entity`](super::Entity)
    EntityId
);
define_id!(
    /// Identifier of a [`Relationship`](super::Relationship)
    RelationshipId
);
define_id!(
    /// Identifier of a [`Category`](super::Category)
    CategoryId
);
define_id!(
    /// Identifier of a [`FacetProperty`](super::FacetProperty); keys the value maps
    PropertyId
);

impl CategoryId {
    /// The reserved id of the single root category
    pub const ROOT: CategoryId = CategoryId::from_uuid(Uuid::from_u128(1));
}
