//! Embedded, file-backed storage for versioned property-graph records.
//!
//! A store directory holds one sub-store per record shape (nodes, edges).
//! Each sub-store is a records file of fixed-size version slots plus an
//! index file mapping stable ids to their first version; the two headers are
//! kept consistent by a bounded-retry commit protocol with rollback.

#![warn(missing_docs)]

pub mod admin;
pub mod db;
pub mod logging;
pub mod primitives;
pub mod storage;
pub mod types;

pub use db::Database;
pub use storage::{EdgeStore, NodeStore, Store, StoreOptions};
pub use types::{EdgeId, Lifetime, NodeId, Result, SlotId, StoreError, StoreFile, Timestamp};
