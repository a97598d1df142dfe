use std::ops::Range;

use super::layout::{get_u64, put_u64, SlotRecord, VersionLinks};
use crate::types::{Lifetime, NodeId, Result, SlotId, StoreError, StoreFile, Timestamp};

const FLAGS: Range<usize> = 0..2;
const VERSION_PREV: Range<usize> = 2..10;
const VERSION_NEXT: Range<usize> = 10..18;
const CREATION_TIME: Range<usize> = 18..26;
const LIFETIME_BEGIN: Range<usize> = 26..34;
const LIFETIME_END: Range<usize> = 34..42;
const UNIQUE_ID: Range<usize> = 42..50;

/// Encoded size of a [`NodeRecord`].
pub const NODE_RECORD_LEN: usize = 50;

const FLAG_IN_USE: u16 = 1 << 0;
const FLAG_HAS_VERSION_PREV: u16 = 1 << 1;
const FLAG_HAS_VERSION_NEXT: u16 = 1 << 2;
const FLAG_HAS_PROP: u16 = 1 << 3;
const FLAG_HAS_EDGE_IN: u16 = 1 << 4;
const FLAG_HAS_EDGE_OUT: u16 = 1 << 5;
const FLAG_KNOWN: u16 = FLAG_IN_USE
    | FLAG_HAS_VERSION_PREV
    | FLAG_HAS_VERSION_NEXT
    | FLAG_HAS_PROP
    | FLAG_HAS_EDGE_IN
    | FLAG_HAS_EDGE_OUT;

/// Attachment flags of a node version. The version-link flags are carried by
/// [`VersionLinks`] instead.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct NodeAttachments {
    /// Properties are attached.
    pub has_prop: bool,
    /// Some edge points at this node.
    pub has_edge_in: bool,
    /// This node is the head of some edge.
    pub has_edge_out: bool,
}

/// One physical version of a node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeRecord {
    /// Stable id of the node.
    pub id: NodeId,
    /// False for vacant slots.
    pub in_use: bool,
    /// When this version was written.
    pub creation_time: Timestamp,
    /// Validity interval of this version.
    pub lifetime: Lifetime,
    /// Property and edge flags.
    pub attachments: NodeAttachments,
    /// Chain pointers.
    pub links: VersionLinks,
}

impl NodeRecord {
    /// First version of a node: in use, no links, no attachments.
    pub fn new(id: NodeId, creation_time: Timestamp, lifetime: Lifetime) -> Self {
        Self {
            id,
            in_use: true,
            creation_time,
            lifetime,
            attachments: NodeAttachments::default(),
            links: VersionLinks::default(),
        }
    }

    fn flags(&self) -> u16 {
        let mut flags = 0;
        if self.in_use {
            flags |= FLAG_IN_USE;
        }
        if self.links.prev.is_some() {
            flags |= FLAG_HAS_VERSION_PREV;
        }
        if self.links.next.is_some() {
            flags |= FLAG_HAS_VERSION_NEXT;
        }
        if self.attachments.has_prop {
            flags |= FLAG_HAS_PROP;
        }
        if self.attachments.has_edge_in {
            flags |= FLAG_HAS_EDGE_IN;
        }
        if self.attachments.has_edge_out {
            flags |= FLAG_HAS_EDGE_OUT;
        }
        flags
    }
}

impl SlotRecord for NodeRecord {
    type Id = NodeId;

    const SIZE: usize = NODE_RECORD_LEN;
    const KIND: &'static str = "nodes";

    fn vacant() -> Self {
        Self {
            id: NodeId(0),
            in_use: false,
            creation_time: Timestamp(0),
            lifetime: Lifetime::from_encoded(0, 0),
            attachments: NodeAttachments::default(),
            links: VersionLinks::default(),
        }
    }

    fn encode(&self, dst: &mut [u8]) {
        dst[FLAGS].copy_from_slice(&self.flags().to_le_bytes());
        put_u64(dst, VERSION_PREV, self.links.prev.map_or(0, |slot| slot.0));
        put_u64(dst, VERSION_NEXT, self.links.next.map_or(0, |slot| slot.0));
        put_u64(dst, CREATION_TIME, self.creation_time.0);
        put_u64(dst, LIFETIME_BEGIN, self.lifetime.begin.0);
        put_u64(dst, LIFETIME_END, self.lifetime.encoded_end());
        put_u64(dst, UNIQUE_ID, self.id.0);
    }

    fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < NODE_RECORD_LEN {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "node record truncated",
            ));
        }
        let flags = u16::from_le_bytes([src[FLAGS.start], src[FLAGS.start + 1]]);
        if flags & !FLAG_KNOWN != 0 {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "unknown node flag bits",
            ));
        }
        let has = |bit: u16| flags & bit != 0;
        Ok(Self {
            id: NodeId(get_u64(src, UNIQUE_ID)),
            in_use: has(FLAG_IN_USE),
            creation_time: Timestamp(get_u64(src, CREATION_TIME)),
            lifetime: Lifetime::from_encoded(
                get_u64(src, LIFETIME_BEGIN),
                get_u64(src, LIFETIME_END),
            ),
            attachments: NodeAttachments {
                has_prop: has(FLAG_HAS_PROP),
                has_edge_in: has(FLAG_HAS_EDGE_IN),
                has_edge_out: has(FLAG_HAS_EDGE_OUT),
            },
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
