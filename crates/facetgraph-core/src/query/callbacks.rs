//! Callback slots of live queries and controllers
//!
//! Each slot holds at most one callback; assigning a slot replaces the
//! previous callback. Callbacks run synchronously inside the change bus
//! delivery that triggered them.

use std::fmt;
use std::sync::Arc;

use crate::domain::{Entity, Relationship};

/// A notification callback
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// The added, changed and removed slots for one aggregate kind
pub struct AggregateCallbacks<T> {
    pub added: Option<Callback<T>>,
    pub changed: Option<Callback<T>>,
    pub removed: Option<Callback<T>>,
}

impl<T> AggregateCallbacks<T> {
    pub fn new() -> Self {
        Self {
            added: None,
            changed: None,
            removed: None,
        }
    }

    pub fn on_added(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.added = Some(Arc::new(f));
        self
    }

    pub fn on_changed(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.changed = Some(Arc::new(f));
        self
    }

    pub fn on_removed(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.removed = Some(Arc::new(f));
        self
    }

    /// The callback for a transition, cloned out so it can run unlocked
    pub(crate) fn slot(&self, transition: Transition) -> Option<Callback<T>> {
        match transition {
            Transition::Added => self.added.clone(),
            Transition::Changed => self.changed.clone(),
            Transition::Removed => self.removed.clone(),
        }
    }
}

impl<T> Default for AggregateCallbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for AggregateCallbacks<T> {
    fn clone(&self) -> Self {
        Self {
            added: self.added.clone(),
            changed: self.changed.clone(),
            removed: self.removed.clone(),
        }
    }
}

impl<T> fmt::Debug for AggregateCallbacks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateCallbacks")
            .field("added", &self.added.is_some())
            .field("changed", &self.changed.is_some())
            .field("removed", &self.removed.is_some())
            .finish()
    }
}

/// Callback slots of a tag query: entities and relationships
#[derive(Debug, Clone, Default)]
pub struct QueryCallbacks {
    pub entities: AggregateCallbacks<Entity>,
    pub relationships: AggregateCallbacks<Relationship>,
}

impl QueryCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(mut self, entities: AggregateCallbacks<Entity>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_relationships(mut self, relationships: AggregateCallbacks<Relationship>) -> Self {
        self.relationships = relationships;
        self
    }
}

/// Membership edge reported to a callback slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Added,
    Changed,
    Removed,
}

/// Run an optional callback
pub(crate) fn fire<T>(callback: Option<Callback<T>>, item: &T) {
    if let Some(callback) = callback {
        callback(item);
    }
}
