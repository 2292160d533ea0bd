//! Document store contract — the seam between this crate and the backend.
//!
//! DESIGN
//! ======
//! Every remote concern (paging, live push, mutations) goes through the
//! [`DocumentStore`] trait so controllers never name a concrete backend.
//! Callers construct one store handle and pass it explicitly to every
//! consumer; there is no implicit global client.
//!
//! A live subscription is represented by [`LiveChannel`]: the backend keeps
//! pushing full ordered snapshots until the channel is dropped, which is
//! the revocation signal.

pub mod memory;

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::record::{FieldMap, Record, cmp_sort_values};

// =============================================================================
// ERRORS
// =============================================================================

/// Failures surfaced by a document store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(Uuid),
    #[error("backend error: {0}")]
    Backend(String),
}

// =============================================================================
// PAGINATION
// =============================================================================

/// Parameters for one page fetch, ordered descending by `sort_field`.
#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    pub collection: &'a str,
    pub sort_field: &'a str,
    /// Maximum records to return.
    pub limit: usize,
    /// Fetch strictly after this position; `None` means the first page.
    pub after: Option<&'a PageCursor>,
}

/// Opaque pagination position: the sort value and id of the last record of
/// the most recently loaded page. Fetching "after" a cursor returns records
/// strictly later in the descending order.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCursor {
    sort_value: Value,
    id: Uuid,
}

impl PageCursor {
    #[must_use]
    pub fn from_record(record: &Record, sort_field: &str) -> Self {
        Self { sort_value: record.sort_key(sort_field).clone(), id: record.id }
    }

    /// Id of the record this cursor points at.
    #[must_use]
    pub fn record_id(&self) -> Uuid {
        self.id
    }

    /// True when `record` sorts strictly after this cursor in descending
    /// order (smaller sort value, or equal value with a smaller id).
    #[must_use]
    pub fn precedes(&self, record: &Record, sort_field: &str) -> bool {
        match cmp_sort_values(record.sort_key(sort_field), &self.sort_value) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => record.id < self.id,
            std::cmp::Ordering::Greater => false,
        }
    }
}

// =============================================================================
// LIVE CHANNEL
// =============================================================================

/// One push on a live channel.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// Full snapshot of the collection in descending sort order.
    Snapshot(Vec<Record>),
    /// Delivery failure. The channel stays open; later snapshots may follow.
    Error(String),
}

/// Receiving side of a live subscription.
///
/// Dropping the channel revokes the subscription: the backend observes the
/// closed receiver and stops pushing.
pub struct LiveChannel {
    events: mpsc::UnboundedReceiver<LiveEvent>,
}

impl LiveChannel {
    #[must_use]
    pub fn new(events: mpsc::UnboundedReceiver<LiveEvent>) -> Self {
        Self { events }
    }

    /// Next event, or `None` once the backend has closed the channel.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Remote document store client.
///
/// Implementations own all transport, persistence, and query concerns;
/// controllers in this crate only do state bookkeeping on top.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch up to `query.limit` records, descending by `query.sort_field`,
    /// strictly after `query.after` when present.
    async fn fetch_page(&self, query: PageQuery<'_>) -> Result<Vec<Record>, StoreError>;

    /// Open a live channel that pushes a full descending snapshot of the
    /// collection now and after every subsequent change.
    async fn open_live_channel(
        &self,
        collection: &str,
        sort_field: &str,
    ) -> Result<LiveChannel, StoreError>;

    /// Create a record from the given fields; returns the assigned id.
    async fn create_record(&self, collection: &str, fields: FieldMap)
    -> Result<Uuid, StoreError>;

    /// Merge `changes` into the identified record's fields.
    async fn update_record(
        &self,
        collection: &str,
        id: Uuid,
        changes: FieldMap,
    ) -> Result<(), StoreError>;

    /// Delete the identified record. Deleting an absent record is not an
    /// error — the outcome (record gone) already holds.
    async fn delete_record(&self, collection: &str, id: Uuid) -> Result<(), StoreError>;
}
