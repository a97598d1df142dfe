//! Version chains: walking them and appending copy-on-write successors.

use tracing::debug;

use super::coordinator;
use super::layout::{RecordsHeader, SlotRecord, VersionLinks};
use super::options::{RetryPolicy, StoreOptions};
use super::records::RecordFile;
use crate::types::{Lifetime, Result, SlotId, StoreError, StoreFile, Timestamp};

/// A record together with the slot it was read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Located<R> {
    /// Where the version lives.
    pub slot: SlotId,
    /// The decoded version.
    pub record: R,
}

/// Reads the record at `slot` and checks it is a live version of `id`.
pub(crate) fn read_version<R: SlotRecord>(
    records: &RecordFile<R>,
    slot: SlotId,
    id: u64,
) -> Result<R> {
    if slot.0 >= records.header().next_slot {
        return Err(StoreError::corrupted(
            StoreFile::Records,
            "version pointer past the last used slot",
        ));
    }
    let record = records.read_slot(slot)?;
    if !record.in_use() || record.stable_id() != id {
        return Err(StoreError::corrupted(
            StoreFile::Records,
            "version slot does not hold the expected id",
        ));
    }
    Ok(record)
}

/// Follows `version_next` from the head at `head_slot`, yielding every
/// version oldest first.
///
/// The walk takes at most `next_slot` steps and checks that each successor
/// links back to its predecessor, so a cycle or dangling pointer surfaces as
/// corruption instead of looping.
pub struct ChainWalk<'a, R: SlotRecord> {
    records: &'a RecordFile<R>,
    id: u64,
    next: Option<(SlotId, Option<SlotId>)>,
    steps: u64,
}

impl<'a, R: SlotRecord> ChainWalk<'a, R> {
    /// Walk of the chain of `id` starting at `head_slot`.
    pub fn new(records: &'a RecordFile<R>, id: u64, head_slot: SlotId) -> Self {
        Self {
            records,
            id,
            next: Some((head_slot, None)),
            steps: 0,
        }
    }

    fn step(&mut self, slot: SlotId, expected_prev: Option<SlotId>) -> Result<Located<R>> {
        self.steps += 1;
        if self.steps > self.records.header().next_slot {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "version chain longer than the records file",
            ));
        }
        let record = read_version(self.records, slot, self.id)?;
        if record.links().prev != expected_prev {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "version chain back-link mismatch",
            ));
        }
        self.next = record.links().next.map(|next| (next, Some(slot)));
        Ok(Located { slot, record })
    }
}

impl<R: SlotRecord> Iterator for ChainWalk<'_, R> {
    type Item = Result<Located<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (slot, expected_prev) = self.next.take()?;
        Some(self.step(slot, expected_prev))
    }
}

/// Every version of `id`, head first.
pub fn read_chain<R: SlotRecord>(
    records: &RecordFile<R>,
    id: u64,
    head_slot: SlotId,
) -> Result<Vec<Located<R>>> {
    ChainWalk::new(records, id, head_slot).collect()
}

/// The tail version of `id`.
pub fn last_version<R: SlotRecord>(
    records: &RecordFile<R>,
    id: u64,
    head_slot: SlotId,
) -> Result<Located<R>> {
    let mut last = None;
    for version in ChainWalk::new(records, id, head_slot) {
        last = Some(version?);
    }
    last.ok_or(StoreError::corrupted(
        StoreFile::Records,
        "empty version chain",
    ))
}

/// Copy-on-write successors for several ids, committed with one records
/// header write.
///
/// Every appended version is written past the registered `next_slot` and the
/// old tail is relinked in place; the pre-link image of each relinked tail is
/// kept so [`VersionBatch::commit`] or a failed append can put every tail
/// back. Either all versions of the batch become visible on disk or none do.
pub struct VersionBatch<'a, R: SlotRecord> {
    records: &'a mut RecordFile<R>,
    retry: RetryPolicy,
    backup: RecordsHeader,
    relinked: Vec<Located<R>>,
}

impl<'a, R: SlotRecord> VersionBatch<'a, R> {
    /// Reserves room for `count` new versions in one growth.
    pub fn begin(records: &'a mut RecordFile<R>, opts: &StoreOptions, count: u64) -> Result<Self> {
        let backup = records.header();
        records.reserve(count, opts)?;
        Ok(Self {
            records,
            retry: opts.header_retry,
            backup,
            relinked: Vec::new(),
        })
    }

    /// Appends a successor of the tail of `id` carrying `lifetime`.
    ///
    /// On failure every tail relinked so far is restored and the working
    /// header is reset; the batch must not be used afterwards.
    pub fn append(&mut self, id: u64, head_slot: SlotId, lifetime: Lifetime) -> Result<Located<R>> {
        match self.append_inner(id, head_slot, lifetime) {
            Ok(located) => Ok(located),
            Err(err) => Err(self.abort(err)),
        }
    }

    fn append_inner(&mut self, id: u64, head_slot: SlotId, lifetime: Lifetime) -> Result<Located<R>> {
        let original = last_version(self.records, id, head_slot)?;
        let copy_slot = SlotId(self.records.header().next_slot);
        if copy_slot.0 >= self.records.header().capacity {
            return Err(StoreError::IllegalArgument("version batch outgrew its reservation"));
        }

        let mut copy = original.record.clone();
        copy.set_creation_time(Timestamp::now());
        copy.set_lifetime(lifetime);
        copy.set_links(VersionLinks {
            prev: Some(original.slot),
            next: None,
        });

        let mut relinked = original.record.clone();
        relinked.set_links(VersionLinks {
            prev: original.record.links().prev,
            next: Some(copy_slot),
        });

        // Bytes past next_slot are unregistered, so a failed copy write
        // leaves nothing to undo.
        self.records
            .write_slot(copy_slot, &copy)
            .map_err(write_failure)?;
        self.relinked.push(original.clone());
        self.records
            .write_slot(original.slot, &relinked)
            .map_err(write_failure)?;
        self.records.header_mut().next_slot += 1;
        debug!(
            kind = R::KIND,
            id,
            from = original.slot.0,
            to = copy_slot.0,
            "chain.append_version"
        );
        Ok(Located {
            slot: copy_slot,
            record: copy,
        })
    }

    /// Flushes the batch and persists the records header.
    pub fn commit(mut self) -> Result<()> {
        if let Err(err) = self.records.flush() {
            return Err(self.abort(write_failure(err)));
        }
        coordinator::commit_versions(self.records, &self.relinked, self.backup, self.retry)?;
        self.relinked.clear();
        Ok(())
    }

    fn abort(&mut self, err: StoreError) -> StoreError {
        let relinked = std::mem::take(&mut self.relinked);
        match coordinator::restore_tails(self.records, &relinked, self.backup) {
            Ok(()) => err,
            Err(restore) => restore,
        }
    }
}

/// Maps a raw I/O failure on record bytes to `WriteFailed`; everything else
/// passes through.
pub(crate) fn write_failure(err: StoreError) -> StoreError {
    match err {
        StoreError::Io(_) => StoreError::WriteFailed("record write failed"),
        other => other,
    }
}
