use std::ops::Range;

use super::layout::{get_u64, put_u64, SlotRecord, VersionLinks};
use crate::types::{EdgeId, Lifetime, NodeId, Result, SlotId, StoreError, StoreFile, Timestamp};

const FLAGS: Range<usize> = 0..2;
const VERSION_PREV: Range<usize> = 2..10;
const VERSION_NEXT: Range<usize> = 10..18;
const CREATION_TIME: Range<usize> = 18..26;
const LIFETIME_BEGIN: Range<usize> = 26..34;
const LIFETIME_END: Range<usize> = 34..42;
const UNIQUE_ID: Range<usize> = 42..50;
const HEAD_NODE: Range<usize> = 50..58;
const TAIL_NODE: Range<usize> = 58..66;

/// Encoded size of an [`EdgeRecord`].
pub const EDGE_RECORD_LEN: usize = 66;

const FLAG_IN_USE: u16 = 1 << 0;
const FLAG_HAS_VERSION_PREV: u16 = 1 << 1;
const FLAG_HAS_VERSION_NEXT: u16 = 1 << 2;
const FLAG_HAS_PROP: u16 = 1 << 3;
const FLAG_KNOWN: u16 = FLAG_IN_USE | FLAG_HAS_VERSION_PREV | FLAG_HAS_VERSION_NEXT | FLAG_HAS_PROP;

/// One physical version of a directed edge `head -> tail`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeRecord {
    /// Stable id of the edge.
    pub id: EdgeId,
    /// False for vacant slots.
    pub in_use: bool,
    /// When this version was written.
    pub creation_time: Timestamp,
    /// Validity interval of this version.
    pub lifetime: Lifetime,
    /// Source node.
    pub head: NodeId,
    /// Target node.
    pub tail: NodeId,
    /// Whether properties are attached.
    pub has_prop: bool,
    /// Chain pointers.
    pub links: VersionLinks,
}

impl EdgeRecord {
    /// First version of an edge: in use, no links, no properties.
    pub fn new(
        id: EdgeId,
        head: NodeId,
        tail: NodeId,
        creation_time: Timestamp,
        lifetime: Lifetime,
    ) -> Self {
        Self {
            id,
            in_use: true,
            creation_time,
            lifetime,
            head,
            tail,
            has_prop: false,
            links: VersionLinks::default(),
        }
    }
}

impl SlotRecord for EdgeRecord {
    type Id = EdgeId;

    const SIZE: usize = EDGE_RECORD_LEN;
    const KIND: &'static str = "edges";

    fn vacant() -> Self {
        Self {
            id: EdgeId(0),
            in_use: false,
            creation_time: Timestamp(0),
            lifetime: Lifetime::from_encoded(0, 0),
            head: NodeId(0),
            tail: NodeId(0),
            has_prop: false,
            links: VersionLinks::default(),
        }
    }

    fn encode(&self, dst: &mut [u8]) {
        let mut flags = 0u16;
        if self.in_use {
            flags |= FLAG_IN_USE;
        }
        if self.links.prev.is_some() {
            flags |= FLAG_HAS_VERSION_PREV;
        }
        if self.links.next.is_some() {
            flags |= FLAG_HAS_VERSION_NEXT;
        }
        if self.has_prop {
            flags |= FLAG_HAS_PROP;
        }
        dst[FLAGS].copy_from_slice(&flags.to_le_bytes());
        put_u64(dst, VERSION_PREV, self.links.prev.map_or(0, |slot| slot.0));
        put_u64(dst, VERSION_NEXT, self.links.next.map_or(0, |slot| slot.0));
        put_u64(dst, CREATION_TIME, self.creation_time.0);
        put_u64(dst, LIFETIME_BEGIN, self.lifetime.begin.0);
        put_u64(dst, LIFETIME_END, self.lifetime.encoded_end());
        put_u64(dst, UNIQUE_ID, self.id.0);
        put_u64(dst, HEAD_NODE, self.head.0);
        put_u64(dst, TAIL_NODE, self.tail.0);
    }

    fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < EDGE_RECORD_LEN {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "edge record truncated",
            ));
        }
        let flags = u16::from_le_bytes([src[FLAGS.start], src[FLAGS.start + 1]]);
        if flags & !FLAG_KNOWN != 0 {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "unknown edge flag bits",
            ));
        }
        let has = |bit: u16| flags & bit != 0;
        Ok(Self {
            id: EdgeId(get_u64(src, UNIQUE_ID)),
            in_use: has(FLAG_IN_USE),
            creation_time: Timestamp(get_u64(src, CREATION_TIME)),
            lifetime: Lifetime::from_encoded(
                get_u64(src, LIFETIME_BEGIN),
                get_u64(src, LIFETIME_END),
            ),
            head: NodeId(get_u64(src, HEAD_NODE)),
            tail: NodeId(get_u64(src, TAIL_NODE)),
            has_prop: has(FLAG_HAS_PROP),
            links: VersionLinks {
                prev: has(FLAG_HAS_VERSION_PREV).then(|| SlotId(get_u64(src, VERSION_PREV))),
                next: has(FLAG_HAS_VERSION_NEXT).then(|| SlotId(get_u64(src, VERSION_NEXT))),
            },
        })
    }

    fn stable_id(&self) -> u64 {
        self.id.0
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn links(&self) -> VersionLinks {
        self.links
    }

    fn set_links(&mut self, links: VersionLinks) {
        self.links = links;
    }

    fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    fn set_lifetime(&mut self, lifetime: Lifetime) {
        self.lifetime = lifetime;
    }

    fn creation_time(&self) -> Timestamp {
        self.creation_time
    }

    fn set_creation_time(&mut self, ts: Timestamp) {
        self.creation_time = ts;
    }
}
