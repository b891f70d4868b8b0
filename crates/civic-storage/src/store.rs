//! Shared key-value store
//!
//! A `SharedStore` owns the database and a change hub. Each open tab or
//! window obtains its own `StoreContext`; writes through a context are
//! delivered to listeners registered by every *other* context, never back
//! to the writer.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::database::Database;
use crate::Result;

/// A change made by another context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed
    pub new_value: Option<String>,
}

pub type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Synchronous, origin-scoped key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Register for changes made by other contexts. The listener stays
    /// registered until the returned guard is released or dropped.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

struct Registration {
    id: u64,
    context_id: u64,
    active: Arc<AtomicBool>,
    listener: Listener,
}

#[derive(Default)]
struct ChangeHub {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl ChangeHub {
    fn register(&self, context_id: u64, listener: Listener) -> (u64, Arc<AtomicBool>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        self.registrations.write().push(Registration {
            id,
            context_id,
            active: Arc::clone(&active),
            listener,
        });

        (id, active)
    }

    fn unregister(&self, id: u64) {
        self.registrations.write().retain(|r| r.id != id);
    }

    fn publish(&self, origin: u64, event: &StoreEvent) {
        // Snapshot so listeners run without the registry lock held
        let targets: Vec<(Arc<AtomicBool>, Listener)> = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.context_id != origin)
            .map(|r| (Arc::clone(&r.active), Arc::clone(&r.listener)))
            .collect();

        tracing::debug!(
            key = %event.key,
            origin,
            listeners = targets.len(),
            "Delivering store change"
        );

        for (active, listener) in targets {
            if active.load(Ordering::Acquire) {
                listener(event);
            }
        }
    }
}

/// Guard for a store listener.
pub struct Subscription {
    hub: Weak<ChangeHub>,
    id: u64,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(hub) = self.hub.upgrade() {
            hub.unregister(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// The store as seen by the whole origin.
pub struct SharedStore {
    db: Database,
    hub: Arc<ChangeHub>,
    next_context: Arc<AtomicU64>,
}

impl SharedStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            hub: Arc::new(ChangeHub::default()),
            next_context: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Open a new execution context (one per tab or window).
    pub fn context(&self) -> StoreContext {
        let id = self.next_context.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(context_id = id, "Opened store context");

        StoreContext {
            id,
            db: self.db.clone(),
            hub: Arc::clone(&self.hub),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl Clone for SharedStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            hub: Arc::clone(&self.hub),
            next_context: Arc::clone(&self.next_context),
        }
    }
}

pub struct StoreContext {
    id: u64,
    db: Database,
    hub: Arc<ChangeHub>,
}

impl StoreContext {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl KeyValueStore for StoreContext {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.db.get_value(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let old_value = self.db.put_value(key, value)?;

        if old_value.as_deref() != Some(value) {
            self.hub.publish(
                self.id,
                &StoreEvent {
                    key: key.to_string(),
                    old_value,
                    new_value: Some(value.to_string()),
                },
            );
        }

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if let Some(old_value) = self.db.delete_value(key)? {
            self.hub.publish(
                self.id,
                &StoreEvent {
                    key: key.to_string(),
                    old_value: Some(old_value),
                    new_value: None,
                },
            );
        }

        Ok(())
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        let (id, active) = self.hub.register(self.id, listener);

        Subscription {
            hub: Arc::downgrade(&self.hub),
            id,
            active,
        }
    }
}
