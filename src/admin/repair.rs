use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::admin::error::{AdminError, Result};
use crate::admin::util::RawFiles;
use crate::primitives::io::{FileIo, StdFileIo};
use crate::storage::{EdgeRecord, IndexHeader, NodeRecord, SlotRecord};
use crate::types::SlotId;

/// Outcome of rebuilding one index file.
#[derive(Clone, Debug, Serialize)]
pub struct RebuildReport {
    /// `nodes` or `edges`.
    pub kind: &'static str,
    /// Cursor found on disk before the rebuild, if the header was readable.
    pub cursor_before: Option<u64>,
    /// Cursor written by the rebuild.
    pub cursor_after: u64,
    /// Used slots that were not the head of any chain.
    pub non_head_slots: u64,
}

/// Rewrites the index file of every sub-store in `dir` from its records
/// file.
///
/// The records header is authoritative: slots `0..next_slot` are scanned
/// for in-use heads (no `version_prev`), each head's slot becomes the entry
/// of its id, and the cursor is set to `next_id`. Fails without writing if
/// some id below `next_id` has no head or has more than one. The store must
/// not be open elsewhere.
pub fn rebuild_index(dir: impl AsRef<Path>) -> Result<Vec<RebuildReport>> {
    let dir = dir.as_ref();
    let nodes = RawFiles::<NodeRecord>::open(dir)?;
    let edges = RawFiles::<EdgeRecord>::open(dir)?;
    if nodes.is_absent() && edges.is_absent() {
        return Err(AdminError::missing_store(dir));
    }
    let mut reports = Vec::new();
    if !nodes.is_absent() {
        reports.push(rebuild::<NodeRecord>(nodes)?);
    }
    if !edges.is_absent() {
        reports.push(rebuild::<EdgeRecord>(edges)?);
    }
    Ok(reports)
}

fn rebuild<R: SlotRecord>(raw: RawFiles<R>) -> Result<RebuildReport> {
    let header = raw.records_header()?;
    let physical = raw.physical_slots()?;
    if physical < header.next_slot {
        return Err(AdminError::Message(format!(
            "{} records file holds {physical} slots but next_slot is {}",
            R::KIND,
            header.next_slot
        )));
    }
    let cursor_before = raw.index_header().ok().map(|h| h.cursor);

    // Decoding guarantees next_id <= next_slot, which the file length bounds.
    let id_count = usize::try_from(header.next_id).map_err(|_| {
        AdminError::Message(format!("{} next_id {} is not addressable", R::KIND, header.next_id))
    })?;
    let mut heads: Vec<Option<SlotId>> = vec![None; id_count];
    let mut non_head_slots = 0u64;
    for slot in (0..header.next_slot).map(SlotId) {
        let record = raw.read_slot(slot)?;
        let id = record.stable_id();
        if !record.in_use() || !record.links().is_head() || id >= header.next_id {
            non_head_slots += 1;
            continue;
        }
        let entry = &mut heads[id as usize];
        if let Some(first) = entry {
            return Err(AdminError::Message(format!(
                "{} id {id} has two heads at slots {} and {}",
                R::KIND,
                first.0,
                slot.0
            )));
        }
        *entry = Some(slot);
    }

    let slots = heads
        .into_iter()
        .enumerate()
        .map(|(id, slot)| {
            slot.ok_or_else(|| {
                AdminError::Message(format!("{} id {id} has no head version", R::KIND))
            })
        })
        .collect::<Result<Vec<SlotId>>>()?;

    let index = match raw.index {
        Some(io) => io,
        None => {
            warn!(kind = R::KIND, path = %raw.index_path.display(), "admin.rebuild.create_index");
            StdFileIo::create_new(&raw.index_path)?
        }
    };
    let mut body: Vec<u8> = IndexHeader {
        cursor: header.next_id,
    }
    .encode()
    .to_vec();
    body.extend(slots.iter().flat_map(|slot| slot.0.to_le_bytes()));
    index.write_at(0, &body)?;
    index.sync_all()?;

    info!(
        kind = R::KIND,
        cursor_before,
        cursor_after = header.next_id,
        "admin.rebuild_index"
    );
    Ok(RebuildReport {
        kind: R::KIND,
        cursor_before,
        cursor_after: header.next_id,
        non_head_slots,
    })
}
