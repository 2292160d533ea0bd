//! Feed controller — paginated + live view over one remote collection.
//!
//! DESIGN
//! ======
//! One controller owns one collection's observable state and republishes it
//! through a `watch` channel: the record list, a loading flag, an error
//! field, a "has more" flag, and the pagination cursor. Remote failures
//! never surface as `Err` from these methods; they land in the snapshot's
//! `error` field and the UI renders them from there.
//!
//! Overlapping page fetches are serialized by outcome, not by blocking:
//! every `fetch_page` call takes a fresh sequence number and a completion
//! is applied only while its number is still the most recently issued.
//! Stale completions are discarded whole — the newest call owns the
//! loading flag and clears it on its own exit.
//!
//! LIFECYCLE
//! =========
//! At most one live subscription exists per controller. Re-subscribing
//! closes the prior channel before opening the new one, and the live slot
//! carries a generation counter: a `subscribe` may only install the channel
//! it opened while its generation is still current, so an overlapping
//! `subscribe` or `dispose` issued during the open always wins. `dispose`
//! is idempotent, and `Drop` also releases the subscription, so the live
//! channel cannot outlive the controller.

#[cfg(test)]
#[path = "feed_test.rs"]
mod feed_test;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::record::{FieldMap, Record};
use crate::store::{DocumentStore, LiveChannel, LiveEvent, PageCursor, PageQuery};

// =============================================================================
// OPTIONS & SNAPSHOT
// =============================================================================

/// Feed configuration.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Field used for descending ordering.
    pub sort_field: String,
    /// Maximum records per page.
    pub page_size: usize,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self { sort_field: "createdAt".to_string(), page_size: 10 }
    }
}

/// Complete observable state of a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    /// Currently loaded records, descending by the configured sort field.
    pub records: Vec<Record>,
    /// True while a page fetch is in flight.
    pub loading: bool,
    /// Message of the most recent failed remote operation, if any.
    pub error: Option<String>,
    /// False once a fetch has returned zero records; never reverts on its own.
    pub has_more: bool,
    /// Position of the last record of the most recently loaded page.
    pub cursor: Option<PageCursor>,
}

impl Default for FeedSnapshot {
    fn default() -> Self {
        Self { records: Vec::new(), loading: false, error: None, has_more: true, cursor: None }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

struct LiveSubscription {
    pump: JoinHandle<()>,
}

impl LiveSubscription {
    /// Abort the pump task; dropping its channel revokes the subscription.
    fn close(self) {
        self.pump.abort();
    }
}

/// Holder of the active subscription. The generation advances on every
/// `subscribe` and `dispose`, so an open that was overtaken while awaiting
/// the backend can tell and must not install its channel.
#[derive(Default)]
struct LiveSlot {
    current: Option<LiveSubscription>,
    generation: u64,
}

/// Paginated + live-updating view over one remote collection.
pub struct FeedController {
    store: Arc<dyn DocumentStore>,
    collection: String,
    options: FeedOptions,
    state: watch::Sender<FeedSnapshot>,
    /// Sequence number of the most recently issued page fetch.
    fetch_seq: AtomicU64,
    live: Mutex<LiveSlot>,
}

impl FeedController {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str, options: FeedOptions) -> Self {
        let (state, _) = watch::channel(FeedSnapshot::default());
        Self {
            store,
            collection: collection.to_string(),
            options,
            state,
            fetch_seq: AtomicU64::new(0),
            live: Mutex::new(LiveSlot::default()),
        }
    }

    /// Observe the feed reactively. The receiver sees every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<FeedSnapshot> {
        self.state.subscribe()
    }

    /// Point-in-time copy of the feed state.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        self.state.borrow().clone()
    }

    fn live_slot(&self) -> MutexGuard<'_, LiveSlot> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // PAGE FETCH
    // =========================================================================

    /// Fetch one page of records, descending by the configured sort field.
    ///
    /// With `is_next_page` false the loaded list is replaced by the first
    /// page and the cursor reset. With `is_next_page` true a page strictly
    /// after the current cursor is appended; without a cursor the call
    /// degrades to a first-page fetch. Failures land in the snapshot's
    /// `error` field — this method never returns them.
    pub async fn fetch_page(&self, is_next_page: bool) {
        let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let cursor = if is_next_page { self.state.borrow().cursor.clone() } else { None };
        let replace = cursor.is_none();

        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let result = self
            .store
            .fetch_page(PageQuery {
                collection: &self.collection,
                sort_field: &self.options.sort_field,
                limit: self.options.page_size,
                after: cursor.as_ref(),
            })
            .await;

        // A newer fetch was issued while this one was in flight: discard the
        // completion whole. The newest call clears the loading flag itself.
        if self.fetch_seq.load(Ordering::SeqCst) != seq {
            debug!(seq, collection = %self.collection, "discarding stale page fetch");
            return;
        }

        match result {
            Ok(page) if page.is_empty() => {
                self.state.send_modify(|s| {
                    s.has_more = false;
                    if replace {
                        s.records.clear();
                        s.cursor = None;
                    }
                    s.loading = false;
                });
            }
            Ok(page) => {
                // Non-empty by the arm above.
                let cursor = page
                    .last()
                    .map(|rec| PageCursor::from_record(rec, &self.options.sort_field));
                self.state.send_modify(|s| {
                    s.cursor = cursor;
                    if replace {
                        s.records = page;
                    } else {
                        s.records.extend(page);
                    }
                    s.loading = false;
                });
            }
            Err(err) => {
                warn!(collection = %self.collection, error = %err, "page fetch failed");
                self.state.send_modify(|s| {
                    s.error = Some(err.to_string());
                    s.loading = false;
                });
            }
        }
    }

    // =========================================================================
    // LIVE SUBSCRIPTION
    // =========================================================================

    /// Open a live channel on the collection. Every pushed snapshot replaces
    /// the loaded list entirely; delivery errors land in the `error` field
    /// without closing the list state.
    ///
    /// A previously held subscription is closed before the new channel
    /// opens, so at most one is ever active. Open failure is recorded in
    /// the `error` field.
    pub async fn subscribe(&self) {
        let generation = {
            let mut slot = self.live_slot();
            if let Some(prev) = slot.current.take() {
                debug!(collection = %self.collection, "closing prior live subscription");
                prev.close();
            }
            slot.generation += 1;
            slot.generation
        };

        let channel = match self
            .store
            .open_live_channel(&self.collection, &self.options.sort_field)
            .await
        {
            Ok(channel) => channel,
            Err(err) => {
                warn!(collection = %self.collection, error = %err, "live channel open failed");
                self.state.send_modify(|s| s.error = Some(err.to_string()));
                return;
            }
        };

        let mut slot = self.live_slot();
        if slot.generation != generation {
            // Another subscribe or a dispose overtook this open while it
            // awaited the backend. Dropping the channel here revokes it.
            debug!(collection = %self.collection, generation, "discarding overtaken live channel");
            return;
        }
        let pump = tokio::spawn(pump_live(channel, self.state.clone(), self.collection.clone()));
        slot.current = Some(LiveSubscription { pump });
    }

    /// Release the live subscription, if one is held. Idempotent; safe to
    /// call when no subscription was ever opened, and cancels a `subscribe`
    /// still awaiting the backend. Also runs on `Drop`.
    pub fn dispose(&self) {
        let mut slot = self.live_slot();
        slot.generation += 1;
        if let Some(live) = slot.current.take() {
            debug!(collection = %self.collection, "releasing live subscription");
            live.close();
        }
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Create a record in the collection. The loaded list is not touched;
    /// a fetch or live push is how the new record becomes visible.
    pub async fn create(&self, fields: FieldMap) {
        if let Err(err) = self.store.create_record(&self.collection, fields).await {
            warn!(collection = %self.collection, error = %err, "create failed");
            self.state.send_modify(|s| s.error = Some(err.to_string()));
        }
    }

    /// Merge a partial field update into the identified record.
    pub async fn update(&self, id: Uuid, changes: FieldMap) {
        if let Err(err) = self.store.update_record(&self.collection, id, changes).await {
            warn!(collection = %self.collection, %id, error = %err, "update failed");
            self.state.send_modify(|s| s.error = Some(err.to_string()));
        }
    }

    /// Delete the identified record.
    pub async fn remove(&self, id: Uuid) {
        if let Err(err) = self.store.delete_record(&self.collection, id).await {
            warn!(collection = %self.collection, %id, error = %err, "delete failed");
            self.state.send_modify(|s| s.error = Some(err.to_string()));
        }
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        self.dispose();
    }
}

// =============================================================================
// LIVE PUMP
// =============================================================================

/// Drain a live channel into the feed state until the channel closes or the
/// owning subscription is aborted.
async fn pump_live(
    mut channel: LiveChannel,
    state: watch::Sender<FeedSnapshot>,
    collection: String,
) {
    while let Some(event) = channel.recv().await {
        match event {
            LiveEvent::Snapshot(records) => {
                state.send_modify(|s| s.records = records);
            }
            LiveEvent::Error(message) => {
                warn!(%collection, %message, "live delivery error");
                state.send_modify(|s| s.error = Some(message));
            }
        }
    }
    debug!(%collection, "live channel closed by backend");
}
