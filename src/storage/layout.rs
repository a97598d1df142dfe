//! Fixed on-disk structures shared by every sub-store.
//!
//! ```text
//! records file: [RecordsHeader][slot 0][slot 1]...[slot capacity-1]
//! index file:   [IndexHeader][entry 0][entry 1]...[entry cursor-1]
//! ```
//!
//! All integers are little-endian and every structure is packed; a slot's
//! byte offset is `RECORDS_HEADER_LEN + slot * R::SIZE`.

use std::convert::TryInto;
use std::fmt::Debug;
use std::ops::Range;

use crate::types::{Lifetime, Result, SlotId, StoreError, StoreFile, Timestamp};

/// Size of the records header in bytes.
pub const RECORDS_HEADER_LEN: usize = 24;
/// Size of the index header in bytes.
pub const INDEX_HEADER_LEN: usize = 8;
/// Size of one index entry in bytes.
pub const INDEX_ENTRY_LEN: usize = 8;

const RH_NEXT_ID: Range<usize> = 0..8;
const RH_NEXT_SLOT: Range<usize> = 8..16;
const RH_CAPACITY: Range<usize> = 16..24;

pub(crate) fn get_u64(src: &[u8], range: Range<usize>) -> u64 {
    u64::from_le_bytes(src[range].try_into().expect("range is 8 bytes"))
}

pub(crate) fn put_u64(dst: &mut [u8], range: Range<usize>, value: u64) {
    dst[range].copy_from_slice(&value.to_le_bytes());
}

/// Per-file allocation state of a records file.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct RecordsHeader {
    /// Next stable identifier to hand out.
    pub next_id: u64,
    /// Next free physical slot.
    pub next_slot: u64,
    /// Number of slots physically allocated.
    pub capacity: u64,
}

impl RecordsHeader {
    /// Header of a freshly created file.
    pub fn empty(capacity: u64) -> Self {
        Self {
            next_id: 0,
            next_slot: 0,
            capacity,
        }
    }

    /// Slots still free before the file has to grow.
    pub fn free_slots(&self) -> u64 {
        self.capacity.saturating_sub(self.next_slot)
    }

    /// Little-endian on-disk form.
    pub fn encode(&self) -> [u8; RECORDS_HEADER_LEN] {
        let mut buf = [0u8; RECORDS_HEADER_LEN];
        put_u64(&mut buf, RH_NEXT_ID, self.next_id);
        put_u64(&mut buf, RH_NEXT_SLOT, self.next_slot);
        put_u64(&mut buf, RH_CAPACITY, self.capacity);
        buf
    }

    /// Parses a header, rejecting `next_id > next_slot > capacity` orderings
    /// as corruption of the records file.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < RECORDS_HEADER_LEN {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "records header truncated",
            ));
        }
        let header = Self {
            next_id: get_u64(src, RH_NEXT_ID),
            next_slot: get_u64(src, RH_NEXT_SLOT),
            capacity: get_u64(src, RH_CAPACITY),
        };
        if header.next_slot > header.capacity {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "next slot beyond capacity",
            ));
        }
        if header.next_id > header.next_slot {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "more ids issued than slots used",
            ));
        }
        Ok(header)
    }
}

/// Header of an index file.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct IndexHeader {
    /// Next stable identifier expected to be indexed.
    pub cursor: u64,
}

impl IndexHeader {
    /// Little-endian on-disk form.
    pub fn encode(&self) -> [u8; INDEX_HEADER_LEN] {
        self.cursor.to_le_bytes()
    }

    /// Parses a header; only truncation is detectable here.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < INDEX_HEADER_LEN {
            return Err(StoreError::corrupted(
                StoreFile::Index,
                "index header truncated",
            ));
        }
        Ok(Self {
            cursor: get_u64(src, 0..INDEX_HEADER_LEN),
        })
    }
}

/// Byte offset of `slot` in a records file of `R`, or `None` when it does
/// not fit in a `u64`.
pub fn slot_offset<R: SlotRecord>(slot: SlotId) -> Option<u64> {
    slot.0
        .checked_mul(R::SIZE as u64)?
        .checked_add(RECORDS_HEADER_LEN as u64)
}

/// Byte offset of the index entry for stable id `id`, or `None` when it does
/// not fit in a `u64`.
pub fn entry_offset(id: u64) -> Option<u64> {
    id.checked_mul(INDEX_ENTRY_LEN as u64)?
        .checked_add(INDEX_HEADER_LEN as u64)
}

/// Version-chain pointers of a record.
///
/// `Some` corresponds to the on-disk `has_version_*` flag being set; the
/// pointer bytes are only meaningful in that case.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VersionLinks {
    /// Slot of the previous (older) version.
    pub prev: Option<SlotId>,
    /// Slot of the next (newer) version.
    pub next: Option<SlotId>,
}

impl VersionLinks {
    /// True for the oldest version of a chain.
    pub fn is_head(&self) -> bool {
        self.prev.is_none()
    }

    /// True for the newest version of a chain.
    pub fn is_tail(&self) -> bool {
        self.next.is_none()
    }
}

/// A fixed-size record shape that can live in a slot/header/index sub-store.
///
/// Nodes and edges implement this; the allocator, version chain manager and
/// consistency coordinator are written once against it.
pub trait SlotRecord: Clone + Debug + Send + 'static {
    /// Caller-facing stable identifier type.
    type Id: Copy + Debug + Eq + From<u64> + Into<u64> + Send;

    /// Encoded size in bytes.
    const SIZE: usize;
    /// Short name used in logs and file names.
    const KIND: &'static str;

    /// A record marking an unused slot (`in_use = false`).
    fn vacant() -> Self;
    /// Serialises into exactly `SIZE` bytes.
    fn encode(&self, dst: &mut [u8]);
    /// Parses `SIZE` bytes.
    fn decode(src: &[u8]) -> Result<Self>;

    /// Stable id shared by every version of the entity.
    fn stable_id(&self) -> u64;
    /// False for vacant slots.
    fn in_use(&self) -> bool;
    /// Chain pointers of this version.
    fn links(&self) -> VersionLinks;
    /// Replaces the chain pointers.
    fn set_links(&mut self, links: VersionLinks);
    /// Validity interval of this version.
    fn lifetime(&self) -> Lifetime;
    /// Replaces the validity interval.
    fn set_lifetime(&mut self, lifetime: Lifetime);
    /// When this version was written.
    fn creation_time(&self) -> Timestamp;
    /// Replaces the creation time.
    fn set_creation_time(&mut self, ts: Timestamp);

    /// Encodes into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.encode(&mut buf);
        buf
    }
}
