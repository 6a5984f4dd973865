//! Live membership view of one tag

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::bus::{ChangeKind, ChangedMessage, ChangedMessageBus, Subscription};
use crate::domain::{Aggregate, Entity, EntityId, Relationship, RelationshipId, Tag, TagId, Tagged};
use crate::error::Result;
use crate::repository::{EntityRepository, RelationshipRepository};

use super::callbacks::{AggregateCallbacks, Callback, QueryCallbacks, Transition, fire};

/// Known items of one kind plus the callbacks reporting their edges
struct Members<T: Aggregate> {
    known: HashMap<T::Id, T>,
    order: Vec<T::Id>,
    callbacks: AggregateCallbacks<T>,
}

impl<T: Tagged> Members<T> {
    fn new(callbacks: AggregateCallbacks<T>) -> Self {
        Self {
            known: HashMap::new(),
            order: Vec::new(),
            callbacks,
        }
    }

    /// Edge produced by a `Modified` message
    fn observe(&mut self, tag: TagId, item: &T) -> Option<Transition> {
        let id = item.id();
        match (item.has_tag(tag), self.known.contains_key(&id)) {
            (true, false) => {
                self.insert(item.clone());
                Some(Transition::Added)
            }
            (true, true) => {
                self.known.insert(id, item.clone());
                Some(Transition::Changed)
            }
            (false, true) => {
                self.forget(id);
                Some(Transition::Removed)
            }
            (false, false) => None,
        }
    }

    /// Record an item found by the initial lookup
    fn admit(&mut self, item: &T) -> Option<Transition> {
        if self.known.contains_key(&item.id()) {
            return None;
        }
        self.insert(item.clone());
        Some(Transition::Added)
    }

    fn insert(&mut self, item: T) {
        self.order.push(item.id());
        self.known.insert(item.id(), item);
    }

    fn forget(&mut self, id: T::Id) -> Option<T> {
        let item = self.known.remove(&id)?;
        self.order.retain(|known| *known != id);
        Some(item)
    }

    fn snapshot(&self) -> Vec<T> {
        self.order
            .iter()
            .filter_map(|id| self.known.get(id).cloned())
            .collect()
    }

    fn drain(&mut self) -> Vec<T> {
        let items = self.snapshot();
        self.known.clear();
        self.order.clear();
        items
    }
}

struct QueryState {
    entities: Members<Entity>,
    relationships: Members<Relationship>,
    subscriptions: Vec<Subscription>,
}

impl QueryState {
    fn callbacks(&self) -> QueryCallbacks {
        QueryCallbacks {
            entities: self.entities.callbacks.clone(),
            relationships: self.relationships.callbacks.clone(),
        }
    }

    fn set_callbacks(&mut self, callbacks: QueryCallbacks) {
        self.entities.callbacks = callbacks.entities;
        self.relationships.callbacks = callbacks.relationships;
    }
}

/// Picks the members of one item kind out of the query state
trait Member: Tagged {
    fn members(state: &mut QueryState) -> &mut Members<Self>;
}

impl Member for Entity {
    fn members(state: &mut QueryState) -> &mut Members<Self> {
        &mut state.entities
    }
}

impl Member for Relationship {
    fn members(state: &mut QueryState) -> &mut Members<Self> {
        &mut state.relationships
    }
}

/// A live view of the entities and relationships carrying one tag
///
/// While started, the query follows the entity and relationship buses and
/// reports membership edges: `added` when an item starts carrying the tag,
/// `removed` when it stops carrying it or is deleted, and `changed` for
/// every other republish of a member, whether or not its content changed.
///
/// ```rust,ignore
/// let query = TagQuery::new(
///     tag,
///     &entities,
///     &relationships,
///     QueryCallbacks::new().with_entities(
///         AggregateCallbacks::new().on_added(|e| println!("+ {}", e.name)),
///     ),
/// )
/// .await?;
/// ```
pub struct TagQuery {
    tag: Tag,
    entities: EntityRepository,
    relationships: RelationshipRepository,
    state: Arc<Mutex<QueryState>>,
}

impl TagQuery {
    /// Create a query and start it
    ///
    /// `callbacks` already observe the `added` notifications of the
    /// initial lookup.
    pub async fn new(
        tag: Tag,
        entities: &EntityRepository,
        relationships: &RelationshipRepository,
        callbacks: QueryCallbacks,
    ) -> Result<Self> {
        let mut query = Self::stopped(tag, entities, relationships, callbacks);
        query.start_query().await?;
        Ok(query)
    }

    /// Create a query without starting it
    pub fn stopped(
        tag: Tag,
        entities: &EntityRepository,
        relationships: &RelationshipRepository,
        callbacks: QueryCallbacks,
    ) -> Self {
        Self {
            tag,
            entities: entities.clone(),
            relationships: relationships.clone(),
            state: Arc::new(Mutex::new(QueryState {
                entities: Members::new(callbacks.entities),
                relationships: Members::new(callbacks.relationships),
                subscriptions: Vec::new(),
            })),
        }
    }

    /// The tag this query tracks
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn is_started(&self) -> bool {
        !self.lock().subscriptions.is_empty()
    }

    /// Subscribe to the buses and report every current member as added
    ///
    /// Does nothing if the query is already started.
    pub async fn start_query(&mut self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }

        let weak = Arc::downgrade(&self.state);
        let subscriptions = vec![
            subscribe(self.entities.bus(), weak.clone(), self.tag.id),
            subscribe(self.relationships.bus(), weak, self.tag.id),
        ];
        self.lock().subscriptions = subscriptions;

        let loaded = async {
            let entities = self.entities.find_by_tag(self.tag.id).await?;
            let relationships = self.relationships.find_by_tag(self.tag.id).await?;
            Ok::<_, crate::Error>((entities, relationships))
        }
        .await;

        let (entities, relationships) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                self.lock().subscriptions.clear();
                return Err(e);
            }
        };

        debug!(
            tag = %self.tag.name,
            entities = entities.len(),
            relationships = relationships.len(),
            "Tag query started"
        );
        for entity in &entities {
            self.admit(entity);
        }
        for relationship in &relationships {
            self.admit(relationship);
        }
        Ok(())
    }

    /// Unsubscribe and report every member as removed
    pub fn stop_query(&mut self) {
        let (entities, relationships, entity_removed, relationship_removed) = {
            let mut state = self.lock();
            if state.subscriptions.is_empty() {
                return;
            }
            state.subscriptions.clear();
            (
                state.entities.drain(),
                state.relationships.drain(),
                state.entities.callbacks.removed.clone(),
                state.relationships.callbacks.removed.clone(),
            )
        };

        debug!(tag = %self.tag.name, "Tag query stopped");
        for entity in &entities {
            fire(entity_removed.clone(), entity);
        }
        for relationship in &relationships {
            fire(relationship_removed.clone(), relationship);
        }
    }

    /// Current callbacks
    pub fn callbacks(&self) -> QueryCallbacks {
        self.lock().callbacks()
    }

    /// Replace every callback slot
    pub fn set_callbacks(&self, callbacks: QueryCallbacks) {
        self.lock().set_callbacks(callbacks);
    }

    /// Reassign individual slots
    pub fn update_callbacks(&self, update: impl FnOnce(&mut QueryCallbacks)) {
        let mut state = self.lock();
        let mut callbacks = state.callbacks();
        update(&mut callbacks);
        state.set_callbacks(callbacks);
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.lock().entities.known.contains_key(&id)
    }

    pub fn contains_relationship(&self, id: RelationshipId) -> bool {
        self.lock().relationships.known.contains_key(&id)
    }

    /// Member entities as last seen, in the order they joined
    pub fn entities(&self) -> Vec<Entity> {
        self.lock().entities.snapshot()
    }

    /// Member relationships as last seen, in the order they joined
    pub fn relationships(&self) -> Vec<Relationship> {
        self.lock().relationships.snapshot()
    }

    fn admit<T: Member>(&self, item: &T) {
        let callback = {
            let mut state = self.lock();
            let members = T::members(&mut state);
            members
                .admit(item)
                .and_then(|transition| members.callbacks.slot(transition))
        };
        fire(callback, item);
    }

    fn lock(&self) -> MutexGuard<'_, QueryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TagQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagQuery")
            .field("tag", &self.tag.name)
            .field("started", &self.is_started())
            .finish()
    }
}

fn subscribe<T: Member>(
    bus: &ChangedMessageBus<T>,
    state: Weak<Mutex<QueryState>>,
    tag: TagId,
) -> Subscription {
    bus.subscribe(move |message| {
        if let Some(state) = state.upgrade() {
            let callback = edge(&state, tag, message);
            fire(callback, &message.payload);
        }
        Ok(())
    })
}

/// Update membership for one message and pick the callback to run
fn edge<T: Member>(
    state: &Mutex<QueryState>,
    tag: TagId,
    message: &ChangedMessage<T>,
) -> Option<Callback<T>> {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    let members = T::members(&mut state);
    let transition = match message.kind {
        ChangeKind::Modified => members.observe(tag, &message.payload)?,
        ChangeKind::Removed => {
            members.forget(message.payload.id())?;
            Transition::Removed
        }
    };
    members.callbacks.slot(transition)
}
