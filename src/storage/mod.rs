//! File-backed record storage.
//!
//! Each sub-store is a records file of fixed-size version slots plus an index
//! file mapping stable ids to the slot of their first version. Nodes and
//! edges share the same allocator, version chain manager and dual-header
//! commit protocol through [`SlotRecord`].

/// Version chain walking and copy-on-write successors.
pub mod chain;
/// Dual-header commit protocol and its rollback paths.
pub mod coordinator;
/// Lock-holding cursors.
pub mod cursor;
/// Edge record shape.
pub mod edge;
/// Index file access.
pub mod index;
/// On-disk headers and the record trait.
pub mod layout;
/// Node record shape.
pub mod node;
/// Store options.
pub mod options;
/// Records file access and slot allocation.
pub mod records;
mod store;
/// Unlocked sub-store core.
pub mod substore;

pub use chain::Located;
pub use cursor::{ScanCursor, VersionCursor};
pub use edge::{EdgeRecord, EDGE_RECORD_LEN};
pub use layout::{
    IndexHeader, RecordsHeader, SlotRecord, VersionLinks, INDEX_ENTRY_LEN, INDEX_HEADER_LEN,
    RECORDS_HEADER_LEN,
};
pub use node::{NodeAttachments, NodeRecord, NODE_RECORD_LEN};
pub use options::{RetryPolicy, StoreOptions, SyncMode, DEFAULT_CAPACITY, MIN_GROWTH_FACTOR};
pub use store::{EdgeStore, NodeStore, Store};
