//! Model controllers
//!
//! Controllers turn the raw `Modified`/`Removed` traffic of all three
//! change buses into added, changed and removed notifications, without any
//! tag filtering. They stay subscribed until disposed or dropped.
//!
//! - [`ModelController`] reports every `Modified` as changed and every
//!   `Removed` as removed.
//! - [`TrackingModelController`] remembers which ids it has seen: the first
//!   `Modified` of an id is reported as added, later ones as changed, and
//!   `Removed` only for ids it knows.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::bus::{ChangeKind, ChangedMessage, ChangedMessageBus, MessageBus, Subscription};
use crate::domain::{Aggregate, Entity, EntityId, Relationship, RelationshipId, Tag, TagId};
use crate::query::{AggregateCallbacks, Callback, Transition, fire};

/// Callback slots of a controller, one set per aggregate kind
#[derive(Debug, Clone, Default)]
pub struct ModelCallbacks {
    pub tags: AggregateCallbacks<Tag>,
    pub entities: AggregateCallbacks<Entity>,
    pub relationships: AggregateCallbacks<Relationship>,
}

impl ModelCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(mut self, tags: AggregateCallbacks<Tag>) -> Self {
        self.tags = tags;
        self
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

struct Side<T: Aggregate> {
    callbacks: AggregateCallbacks<T>,
    /// `None` for a passthrough controller
    known: Option<HashSet<T::Id>>,
}

impl<T: Aggregate> Side<T> {
    fn new(callbacks: AggregateCallbacks<T>, tracking: bool) -> Self {
        Self {
            callbacks,
            known: tracking.then(HashSet::new),
        }
    }

    fn transition(&mut self, message: &ChangedMessage<T>) -> Option<Transition> {
        let id = message.payload.id();
        match (&mut self.known, message.kind) {
            (None, ChangeKind::Modified) => Some(Transition::Changed),
            (None, ChangeKind::Removed) => Some(Transition::Removed),
            (Some(known), ChangeKind::Modified) => Some(if known.insert(id) {
                Transition::Added
            } else {
                Transition::Changed
            }),
            (Some(known), ChangeKind::Removed) => known.remove(&id).then_some(Transition::Removed),
        }
    }

    fn knows(&self, id: &T::Id) -> bool {
        self.known.as_ref().is_some_and(|known| known.contains(id))
    }
}

struct ControllerState {
    tags: Side<Tag>,
    entities: Side<Entity>,
    relationships: Side<Relationship>,
}

impl ControllerState {
    fn callbacks(&self) -> ModelCallbacks {
        ModelCallbacks {
            tags: self.tags.callbacks.clone(),
            entities: self.entities.callbacks.clone(),
            relationships: self.relationships.callbacks.clone(),
        }
    }

    fn set_callbacks(&mut self, callbacks: ModelCallbacks) {
        self.tags.callbacks = callbacks.tags;
        self.entities.callbacks = callbacks.entities;
        self.relationships.callbacks = callbacks.relationships;
    }
}

trait Controlled: Aggregate {
    fn side(state: &mut ControllerState) -> &mut Side<Self>;
}

impl Controlled for Tag {
    fn side(state: &mut ControllerState) -> &mut Side<Self> {
        &mut state.tags
    }
}

impl Controlled for Entity {
    fn side(state: &mut ControllerState) -> &mut Side<Self> {
        &mut state.entities
    }
}

impl Controlled for Relationship {
    fn side(state: &mut ControllerState) -> &mut Side<Self> {
        &mut state.relationships
    }
}

/// Subscriptions plus state shared by both controller flavors
struct Controller {
    state: Arc<Mutex<ControllerState>>,
    subscriptions: Vec<Subscription>,
}

impl Controller {
    fn attach(bus: &MessageBus, callbacks: ModelCallbacks, tracking: bool) -> Self {
        let state = Arc::new(Mutex::new(ControllerState {
            tags: Side::new(callbacks.tags, tracking),
            entities: Side::new(callbacks.entities, tracking),
            relationships: Side::new(callbacks.relationships, tracking),
        }));
        let weak = Arc::downgrade(&state);
        let subscriptions = vec![
            subscribe(bus.tags(), weak.clone()),
            subscribe(bus.entities(), weak.clone()),
            subscribe(bus.relationships(), weak),
        ];
        Self {
            state,
            subscriptions,
        }
    }

    fn dispose(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }

    fn is_active(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_callbacks(&self, update: impl FnOnce(&mut ModelCallbacks)) {
        let mut state = self.lock();
        let mut callbacks = state.callbacks();
        update(&mut callbacks);
        state.set_callbacks(callbacks);
    }
}

fn subscribe<T: Controlled>(
    bus: &ChangedMessageBus<T>,
    state: Weak<Mutex<ControllerState>>,
) -> Subscription {
    bus.subscribe(move |message| {
        let Some(state) = state.upgrade() else {
            return Ok(());
        };
        let callback: Option<Callback<T>> = {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            let side = T::side(&mut state);
            side.transition(message)
                .and_then(|transition| side.callbacks.slot(transition))
        };
        fire(callback, &message.payload);
        Ok(())
    })
}

/// Stateless passthrough of all three buses
pub struct ModelController {
    inner: Controller,
}

impl ModelController {
    /// Subscribe to every bus of `bus`
    pub fn new(bus: &MessageBus, callbacks: ModelCallbacks) -> Self {
        Self {
            inner: Controller::attach(bus, callbacks, false),
        }
    }

    /// Unsubscribe from all buses; idempotent
    pub fn dispose(&mut self) {
        self.inner.dispose();
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn callbacks(&self) -> ModelCallbacks {
        self.inner.lock().callbacks()
    }

    pub fn set_callbacks(&self, callbacks: ModelCallbacks) {
        self.inner.lock().set_callbacks(callbacks);
    }

    pub fn update_callbacks(&self, update: impl FnOnce(&mut ModelCallbacks)) {
        self.inner.update_callbacks(update);
    }
}

/// Controller that reports the first sighting of an id as added
pub struct TrackingModelController {
    inner: Controller,
}

impl TrackingModelController {
    /// Subscribe to every bus of `bus`; nothing is known yet
    pub fn new(bus: &MessageBus, callbacks: ModelCallbacks) -> Self {
        Self {
            inner: Controller::attach(bus, callbacks, true),
        }
    }

    /// Unsubscribe from all buses; idempotent
    pub fn dispose(&mut self) {
        self.inner.dispose();
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn callbacks(&self) -> ModelCallbacks {
        self.inner.lock().callbacks()
    }

    pub fn set_callbacks(&self, callbacks: ModelCallbacks) {
        self.inner.lock().set_callbacks(callbacks);
    }

    pub fn update_callbacks(&self, update: impl FnOnce(&mut ModelCallbacks)) {
        self.inner.update_callbacks(update);
    }

    pub fn knows_tag(&self, id: TagId) -> bool {
        self.inner.lock().tags.knows(&id)
    }

    pub fn knows_entity(&self, id: EntityId) -> bool {
        self.inner.lock().entities.knows(&id)
    }

    pub fn knows_relationship(&self, id: RelationshipId) -> bool {
        self.inner.lock().relationships.knows(&id)
    }
}
