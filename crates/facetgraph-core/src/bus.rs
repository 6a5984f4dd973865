//! In-process change bus
//!
//! Repositories publish a [`ChangedMessage`] after every successful write.
//! Delivery is synchronous: `publish` runs every live subscriber, in
//! subscription order, before it returns. A handler that publishes again
//! produces a nested, depth-first notification. The first handler error
//! stops the fan-out and is returned to the publisher.
//!
//! ```rust,ignore
//! let bus = MessageBus::new();
//! let _subscription = bus.entities().subscribe(|msg| {
//!     println!("{:?} {}", msg.kind, msg.payload.name);
//!     Ok(())
//! });
//! bus.entities().modified(entity)?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tracing::debug;

use crate::domain::{Entity, Relationship, Tag};
use crate::error::Result;

/// What happened to the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Inserted or replaced
    Modified,
    /// Deleted
    Removed,
}

/// A change notification
#[derive(Debug, Clone)]
pub struct ChangedMessage<T> {
    pub kind: ChangeKind,
    pub payload: T,
}

type Handler<T> = Arc<dyn Fn(&ChangedMessage<T>) -> Result<()> + Send + Sync>;

struct Subscriber<T> {
    id: u64,
    active: Arc<AtomicBool>,
    handler: Handler<T>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: Arc::clone(&self.active),
            handler: Arc::clone(&self.handler),
        }
    }
}

struct BusInner<T> {
    name: &'static str,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber<T>>>,
}

impl<T> BusInner<T> {
    fn detach(&self, id: u64) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| s.id != id);
    }
}

/// Publish/subscribe channel for one aggregate kind
pub struct ChangedMessageBus<T> {
    inner: Arc<BusInner<T>>,
}

impl<T> Clone for ChangedMessageBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> ChangedMessageBus<T> {
    /// Create a bus; `name` only shows up in logs
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(BusInner {
                name,
                next_id: AtomicU64::new(0),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a handler; delivery stops once the returned handle is
    /// unsubscribed or dropped
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChangedMessage<T>) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                active: Arc::clone(&active),
                handler: Arc::new(handler),
            });

        let inner: Weak<BusInner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            active,
            detach: Mutex::new(Some(Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.detach(id);
                }
            }))),
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver a message to every live subscriber
    pub fn publish(&self, message: &ChangedMessage<T>) -> Result<()> {
        // Snapshot so handlers may subscribe, unsubscribe or publish reentrantly
        let subscribers: Vec<Subscriber<T>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        debug!(
            bus = self.inner.name,
            kind = ?message.kind,
            subscribers = subscribers.len(),
            "Publishing change"
        );

        for subscriber in subscribers {
            if subscriber.active.load(Ordering::Acquire) {
                (subscriber.handler)(message)?;
            }
        }
        Ok(())
    }

    /// Publish a `Modified` message
    pub fn modified(&self, payload: T) -> Result<()> {
        self.publish(&ChangedMessage {
            kind: ChangeKind::Modified,
            payload,
        })
    }

    /// Publish a `Removed` message
    pub fn removed(&self, payload: T) -> Result<()> {
        self.publish(&ChangedMessage {
            kind: ChangeKind::Removed,
            payload,
        })
    }
}

type Detach = Box<dyn FnOnce() + Send>;

/// Handle of a bus subscription
///
/// Unsubscribing is idempotent and takes effect immediately, including for
/// a publish that is already in progress. Dropping the handle unsubscribes.
pub struct Subscription {
    active: Arc<AtomicBool>,
    detach: Mutex<Option<Detach>>,
}

impl Subscription {
    /// Stop delivery to this subscriber
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::Release);
        let detach = self
            .detach
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(detach) = detach {
            detach();
        }
    }

    /// Whether messages are still delivered
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// The three change buses of a model, one per aggregate kind
///
/// Construct one per model and hand clones to every repository, query and
/// controller; clones share the same subscribers.
#[derive(Clone)]
pub struct MessageBus {
    tags: ChangedMessageBus<Tag>,
    entities: ChangedMessageBus<Entity>,
    relationships: ChangedMessageBus<Relationship>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            tags: ChangedMessageBus::new("tags"),
            entities: ChangedMessageBus::new("entities"),
            relationships: ChangedMessageBus::new("relationships"),
        }
    }

    pub fn tags(&self) -> &ChangedMessageBus<Tag> {
        &self.tags
    }

    pub fn entities(&self) -> &ChangedMessageBus<Entity> {
        &self.entities
    }

    pub fn relationships(&self) -> &ChangedMessageBus<Relationship> {
        &self.relationships
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
