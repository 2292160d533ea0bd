//! # docfeed
//!
//! Reactive client-side state over a remote document store.
//!
//! The crate wraps a pluggable backend (the [`DocumentStore`] trait) and
//! republishes its state as `tokio::sync::watch` channels a view layer can
//! observe: a paginated + live-updating record feed ([`FeedController`]),
//! an authentication status observer ([`AuthStatus`]), and an
//! authentication action dispatcher ([`AuthActions`]).
//!
//! DESIGN
//! ======
//! Backends are passed in as explicit `Arc` handles — nothing in this crate
//! reaches for process-global state. Remote failures never propagate to the
//! caller as `Err`; each controller captures them into an observable `error`
//! field, so UI code reads one snapshot type per domain and renders it.

pub mod auth;
pub mod feed;
pub mod record;
pub mod store;

pub use auth::{
    AuthActions, AuthActionsSnapshot, AuthChange, AuthClient, AuthError, AuthStatus,
    AuthStatusSnapshot, AuthUser, MemoryAuth,
};
pub use feed::{FeedController, FeedOptions, FeedSnapshot};
pub use record::{FieldMap, Record};
pub use store::memory::MemoryStore;
pub use store::{DocumentStore, LiveChannel, LiveEvent, PageCursor, PageQuery, StoreError};
