//! In-memory document store with live snapshot push.
//!
//! DESIGN
//! ======
//! Reference backend used by tests and demos. Collections are plain maps
//! under a `tokio::sync::RwLock`; every successful mutation rebuilds a full
//! descending snapshot and pushes it to each live watcher of the mutated
//! collection. Watchers whose receiving side has been dropped are pruned on
//! the next notification pass — dropping the `LiveChannel` is revocation.
//!
//! Sort order ties are broken by record id so pagination is deterministic
//! even when many records share a sort value.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::record::{FieldMap, Record, cmp_sort_values};
use crate::store::{DocumentStore, LiveChannel, LiveEvent, PageQuery, StoreError};

// =============================================================================
// TYPES
// =============================================================================

struct Watcher {
    sort_field: String,
    tx: mpsc::UnboundedSender<LiveEvent>,
}

#[derive(Default)]
struct Collection {
    records: HashMap<Uuid, FieldMap>,
    watchers: Vec<Watcher>,
}

impl Collection {
    /// All records in descending sort order, ties broken by descending id.
    fn sorted(&self, sort_field: &str) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .records
            .iter()
            .map(|(id, fields)| Record::new(*id, fields.clone()))
            .collect();
        records.sort_by(|a, b| {
            cmp_sort_values(b.sort_key(sort_field), a.sort_key(sort_field))
                .then_with(|| b.id.cmp(&a.id))
        });
        records
    }

    /// Push a fresh snapshot to every live watcher, pruning closed ones.
    fn notify(&mut self) {
        self.watchers.retain(|w| !w.tx.is_closed());
        for watcher in &self.watchers {
            let snapshot = self.sorted(&watcher.sort_field);
            let _ = watcher.tx.send(LiveEvent::Snapshot(snapshot));
        }
    }
}

/// In-memory [`DocumentStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    /// Armed failure message consumed by the next operation.
    fail_next: Mutex<Option<String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot failure: the next store operation returns
    /// `StoreError::Backend` carrying `message` instead of running.
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(message.to_string());
    }

    /// Number of live watchers currently attached to `collection`.
    /// Closed watchers are pruned before counting.
    pub async fn subscriber_count(&self, collection: &str) -> usize {
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection) {
            Some(col) => {
                col.watchers.retain(|w| !w.tx.is_closed());
                col.watchers.len()
            }
            None => 0,
        }
    }

    fn take_fault(&self) -> Result<(), StoreError> {
        match self
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(message) => Err(StoreError::Backend(message)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// STORE IMPL
// =============================================================================

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_page(&self, query: PageQuery<'_>) -> Result<Vec<Record>, StoreError> {
        self.take_fault()?;
        let collections = self.collections.read().await;
        let Some(col) = collections.get(query.collection) else {
            return Ok(Vec::new());
        };
        let page = col
            .sorted(query.sort_field)
            .into_iter()
            .filter(|rec| match query.after {
                Some(cursor) => cursor.precedes(rec, query.sort_field),
                None => true,
            })
            .take(query.limit)
            .collect();
        Ok(page)
    }

    async fn open_live_channel(
        &self,
        collection: &str,
        sort_field: &str,
    ) -> Result<LiveChannel, StoreError> {
        self.take_fault()?;
        let mut collections = self.collections.write().await;
        let col = collections.entry(collection.to_string()).or_default();

        let (tx, rx) = mpsc::unbounded_channel();
        // Initial snapshot fires immediately, before any mutation.
        let _ = tx.send(LiveEvent::Snapshot(col.sorted(sort_field)));
        col.watchers.push(Watcher { sort_field: sort_field.to_string(), tx });
        Ok(LiveChannel::new(rx))
    }

    async fn create_record(
        &self,
        collection: &str,
        fields: FieldMap,
    ) -> Result<Uuid, StoreError> {
        self.take_fault()?;
        let mut collections = self.collections.write().await;
        let col = collections.entry(collection.to_string()).or_default();
        let id = Uuid::new_v4();
        col.records.insert(id, fields);
        col.notify();
        Ok(id)
    }

    async fn update_record(
        &self,
        collection: &str,
        id: Uuid,
        changes: FieldMap,
    ) -> Result<(), StoreError> {
        self.take_fault()?;
        let mut collections = self.collections.write().await;
        let col = collections
            .get_mut(collection)
            .ok_or(StoreError::NotFound(id))?;
        let fields = col.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        for (name, value) in changes {
            fields.insert(name, value);
        }
        col.notify();
        Ok(())
    }

    async fn delete_record(&self, collection: &str, id: Uuid) -> Result<(), StoreError> {
        self.take_fault()?;
        let mut collections = self.collections.write().await;
        if let Some(col) = collections.get_mut(collection) {
            if col.records.remove(&id).is_some() {
                col.notify();
            }
        }
        Ok(())
    }
}
