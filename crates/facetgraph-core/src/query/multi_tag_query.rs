//! De-duplicated union of several tag queries

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::domain::{Aggregate, Entity, EntityId, Relationship, RelationshipId, Tag, TagId};
use crate::error::Result;
use crate::repository::{EntityRepository, RelationshipRepository};

use super::callbacks::{AggregateCallbacks, Callback, QueryCallbacks, Transition, fire};
use super::tag_query::TagQuery;

/// Reference counts of one item kind: how many tag queries hold each item
struct Counts<T: Aggregate> {
    refs: HashMap<T::Id, (usize, T)>,
    callbacks: AggregateCallbacks<T>,
}

impl<T: Aggregate> Counts<T> {
    fn new(callbacks: AggregateCallbacks<T>) -> Self {
        Self {
            refs: HashMap::new(),
            callbacks,
        }
    }

    /// One more tag query holds the item; `added` on the first
    fn acquire(&mut self, item: &T) -> Option<Transition> {
        let entry = self.refs.entry(item.id()).or_insert((0, item.clone()));
        entry.0 += 1;
        entry.1 = item.clone();
        (entry.0 == 1).then_some(Transition::Added)
    }

    /// A tag query dropped the item because it lost that tag or was deleted
    ///
    /// `removed` once nothing holds the item, `changed` while other tags
    /// still do.
    fn release(&mut self, item: &T) -> Option<Transition> {
        let id = item.id();
        let entry = self.refs.get_mut(&id)?;
        entry.0 -= 1;
        if entry.0 == 0 {
            self.refs.remove(&id);
            Some(Transition::Removed)
        } else {
            entry.1 = item.clone();
            Some(Transition::Changed)
        }
    }

    /// A tag query was removed from the union; only the last holder reports
    fn withdraw(&mut self, item: &T) -> Option<Transition> {
        match self.release(item)? {
            Transition::Removed => Some(Transition::Removed),
            _ => None,
        }
    }

    fn touch(&mut self, item: &T) -> Option<Transition> {
        let entry = self.refs.get_mut(&item.id())?;
        entry.1 = item.clone();
        Some(Transition::Changed)
    }

    fn items(&self) -> Vec<T> {
        self.refs.values().map(|(_, item)| item.clone()).collect()
    }
}

struct MultiState {
    entities: Counts<Entity>,
    relationships: Counts<Relationship>,
}

trait Counted: Aggregate {
    fn counts(state: &mut MultiState) -> &mut Counts<Self>;
}

impl Counted for Entity {
    fn counts(state: &mut MultiState) -> &mut Counts<Self> {
        &mut state.entities
    }
}

impl Counted for Relationship {
    fn counts(state: &mut MultiState) -> &mut Counts<Self> {
        &mut state.relationships
    }
}

/// The union of the memberships of several tags
///
/// Every tag added gets its own started [`TagQuery`]. An item matched by
/// more than one tag is reported as added once, when the first tag picks
/// it up, and as removed once, when the last tag lets go of it. A member
/// losing one of several matching tags is reported as changed. A change
/// to a member is forwarded once per tag query holding it.
pub struct MultiTagQuery {
    entities: EntityRepository,
    relationships: RelationshipRepository,
    queries: Vec<TagQuery>,
    state: Arc<Mutex<MultiState>>,
}

impl MultiTagQuery {
    /// Create an empty query
    pub fn new(
        entities: &EntityRepository,
        relationships: &RelationshipRepository,
        callbacks: QueryCallbacks,
    ) -> Self {
        Self {
            entities: entities.clone(),
            relationships: relationships.clone(),
            queries: Vec::new(),
            state: Arc::new(Mutex::new(MultiState {
                entities: Counts::new(callbacks.entities),
                relationships: Counts::new(callbacks.relationships),
            })),
        }
    }

    /// Start tracking a tag; `false` if it is already tracked
    pub async fn add(&mut self, tag: Tag) -> Result<bool> {
        if self.queries.iter().any(|q| q.tag().id == tag.id) {
            return Ok(false);
        }

        let name = tag.name.clone();
        let query = TagQuery::new(tag, &self.entities, &self.relationships, self.wire()).await?;
        debug!(tag = %name, tags = self.queries.len() + 1, "Tag added to multi-tag query");
        self.queries.push(query);
        Ok(true)
    }

    /// Stop tracking a tag; `false` if it was not tracked
    ///
    /// Items held only by this tag are reported as removed. Items still
    /// held by another tag are not reported.
    pub fn remove(&mut self, tag: TagId) -> bool {
        let Some(pos) = self.queries.iter().position(|q| q.tag().id == tag) else {
            return false;
        };
        let mut query = self.queries.remove(pos);
        query.set_callbacks(QueryCallbacks::new());
        let entities = query.entities();
        let relationships = query.relationships();
        query.stop_query();

        for entity in &entities {
            self.withdraw(entity);
        }
        for relationship in &relationships {
            self.withdraw(relationship);
        }
        debug!(tag = %query.tag().name, "Tag removed from multi-tag query");
        true
    }

    /// Stop tracking every tag
    pub fn clear(&mut self) {
        let tags = self.tags();
        for tag in tags {
            self.remove(tag);
        }
    }

    /// Ids of the tracked tags, in the order they were added
    pub fn tags(&self) -> Vec<TagId> {
        self.queries.iter().map(|q| q.tag().id).collect()
    }

    pub fn contains_tag(&self, tag: TagId) -> bool {
        self.queries.iter().any(|q| q.tag().id == tag)
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.lock().entities.refs.contains_key(&id)
    }

    pub fn contains_relationship(&self, id: RelationshipId) -> bool {
        self.lock().relationships.refs.contains_key(&id)
    }

    /// Member entities as last seen, in no particular order
    pub fn entities(&self) -> Vec<Entity> {
        self.lock().entities.items()
    }

    /// Member relationships as last seen, in no particular order
    pub fn relationships(&self) -> Vec<Relationship> {
        self.lock().relationships.items()
    }

    /// Current callbacks
    pub fn callbacks(&self) -> QueryCallbacks {
        let state = self.lock();
        QueryCallbacks {
            entities: state.entities.callbacks.clone(),
            relationships: state.relationships.callbacks.clone(),
        }
    }

    /// Replace every callback slot
    pub fn set_callbacks(&self, callbacks: QueryCallbacks) {
        let mut state = self.lock();
        state.entities.callbacks = callbacks.entities;
        state.relationships.callbacks = callbacks.relationships;
    }

    /// Reassign individual slots
    pub fn update_callbacks(&self, update: impl FnOnce(&mut QueryCallbacks)) {
        let mut callbacks = self.callbacks();
        update(&mut callbacks);
        self.set_callbacks(callbacks);
    }

    /// Callbacks for a new tag query, feeding the reference counts
    fn wire(&self) -> QueryCallbacks {
        QueryCallbacks {
            entities: wire_counts(&self.state),
            relationships: wire_counts(&self.state),
        }
    }

    fn withdraw<T: Counted>(&self, item: &T) {
        let callback = {
            let mut state = self.lock();
            let counts = T::counts(&mut state);
            counts
                .withdraw(item)
                .and_then(|transition| counts.callbacks.slot(transition))
        };
        fire(callback, item);
    }

    fn lock(&self) -> MutexGuard<'_, MultiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MultiTagQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiTagQuery")
            .field("tags", &self.queries)
            .finish()
    }
}

fn wire_counts<T: Counted>(state: &Arc<Mutex<MultiState>>) -> AggregateCallbacks<T> {
    let added = Arc::downgrade(state);
    let changed = Arc::downgrade(state);
    let removed = Arc::downgrade(state);
    AggregateCallbacks::new()
        .on_added(move |item: &T| apply(&added, item, Counts::acquire))
        .on_changed(move |item: &T| apply(&changed, item, Counts::touch))
        .on_removed(move |item: &T| apply(&removed, item, Counts::release))
}

fn apply<T: Counted>(
    state: &Weak<Mutex<MultiState>>,
    item: &T,
    step: fn(&mut Counts<T>, &T) -> Option<Transition>,
) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let callback: Option<Callback<T>> = {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        let counts = T::counts(&mut state);
        step(counts, item).and_then(|transition| counts.callbacks.slot(transition))
    };
    fire(callback, item);
}
