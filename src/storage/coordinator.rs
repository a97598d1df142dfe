//! Dual-header commit protocol.
//!
//! Record bytes and index entries are written and flushed first. The records
//! header is then persisted, then the index header, each under the retry
//! policy. The outcome decides what is rolled back:
//!
//! | records header | index header | action                                 | result                 |
//! |----------------|--------------|----------------------------------------|------------------------|
//! | ok             | ok           | none                                   | `Ok`                   |
//! | ok             | failed       | restore index, then records header     | `WriteFailed`          |
//! | failed         | ok           | restore index header                   | `WriteFailed`          |
//! | failed         | failed       | none                                   | `WriteFailed`          |
//!
//! A rollback that cannot be persisted turns the result into `Corrupted`
//! naming the file whose header could not be restored. Whatever the outcome
//! on disk, the cached headers are reset to the backup on failure.
//!
//! Lifetime changes touch the records file only. All versions of one call are
//! written and their old tails relinked, then the records header is persisted
//! once. If it cannot be, every old tail is restored and the call reports
//! `WriteFailed`; a tail that cannot be restored makes it `Corrupted`.

use tracing::{debug, error, warn};

use super::chain::Located;
use super::index::IndexFile;
use super::layout::{IndexHeader, RecordsHeader, SlotRecord};
use super::options::RetryPolicy;
use super::records::RecordFile;
use crate::types::{Result, StoreError, StoreFile};

/// Pre-operation copies of both cached headers.
#[derive(Copy, Clone, Debug)]
pub struct HeaderBackup {
    /// Records header before the operation.
    pub records: RecordsHeader,
    /// Index header before the operation.
    pub index: IndexHeader,
}

impl HeaderBackup {
    /// Snapshots both cached headers.
    pub fn capture<R: SlotRecord>(records: &RecordFile<R>, index: &IndexFile) -> Self {
        Self {
            records: records.header(),
            index: index.header(),
        }
    }

    /// Puts both cached headers back. Nothing is written.
    pub fn restore<R: SlotRecord>(&self, records: &mut RecordFile<R>, index: &mut IndexFile) {
        records.set_header(self.records);
        index.set_header(self.index);
    }
}

pub(crate) fn persist_records_header<R: SlotRecord>(
    records: &RecordFile<R>,
    header: &RecordsHeader,
    retry: RetryPolicy,
) -> Result<()> {
    retry.run(|attempt| {
        records.persist_header(header).map_err(|err| {
            warn!(kind = R::KIND, attempt, error = %err, "coordinator.records_header.retry");
            err
        })
    })
}

pub(crate) fn persist_index_header(
    index: &IndexFile,
    header: &IndexHeader,
    retry: RetryPolicy,
) -> Result<()> {
    retry.run(|attempt| {
        index.persist_header(header).map_err(|err| {
            warn!(attempt, error = %err, "coordinator.index_header.retry");
            err
        })
    })
}

/// Persists the cached headers of both files after a batch of records and
/// index entries has been written.
pub fn commit_batch<R: SlotRecord>(
    records: &mut RecordFile<R>,
    index: &mut IndexFile,
    backup: HeaderBackup,
    retry: RetryPolicy,
) -> Result<()> {
    let records_header = records.header();
    let index_header = index.header();
    let records_ok = persist_records_header(records, &records_header, retry).is_ok();
    let index_ok = persist_index_header(index, &index_header, retry).is_ok();

    let outcome = match (records_ok, index_ok) {
        (true, true) => {
            debug!(kind = R::KIND, ?records_header, ?index_header, "coordinator.commit");
            return Ok(());
        }
        (false, false) => Err(StoreError::WriteFailed("neither header could be persisted")),
        (false, true) => match persist_index_header(index, &backup.index, retry) {
            Ok(()) => Err(StoreError::WriteFailed("records header could not be persisted")),
            Err(_) => Err(StoreError::corrupted(
                StoreFile::Index,
                "index header rollback failed",
            )),
        },
        (true, false) => {
            let index_rollback = persist_index_header(index, &backup.index, retry);
            let records_rollback = persist_records_header(records, &backup.records, retry);
            match (index_rollback, records_rollback) {
                (Ok(()), Ok(())) => Err(StoreError::WriteFailed(
                    "index header could not be persisted",
                )),
                (Err(_), _) => Err(StoreError::corrupted(
                    StoreFile::Index,
                    "index header rollback failed",
                )),
                (Ok(()), Err(_)) => Err(StoreError::corrupted(
                    StoreFile::Records,
                    "records header rollback failed",
                )),
            }
        }
    };

    backup.restore(records, index);
    if let Err(err) = &outcome {
        if err.is_corruption() {
            error!(kind = R::KIND, error = %err, "coordinator.corrupted");
        } else {
            warn!(kind = R::KIND, records_ok, index_ok, "coordinator.rolled_back");
        }
    }
    outcome
}

/// Persists the cached records header after a batch of new versions was
/// linked in.
///
/// `relinked` holds the pre-link image of every old tail, in the order they
/// were rewritten. If the header cannot be persisted the images are written
/// back so no old tail points at an unregistered slot.
pub fn commit_versions<R: SlotRecord>(
    records: &mut RecordFile<R>,
    relinked: &[Located<R>],
    backup: RecordsHeader,
    retry: RetryPolicy,
) -> Result<()> {
    let header = records.header();
    if persist_records_header(records, &header, retry).is_ok() {
        debug!(kind = R::KIND, versions = relinked.len(), "coordinator.versions.commit");
        return Ok(());
    }
    restore_tails(records, relinked, backup)?;
    warn!(kind = R::KIND, versions = relinked.len(), "coordinator.versions.rolled_back");
    Err(StoreError::WriteFailed("records header could not be persisted"))
}

/// Writes back the pre-link images in reverse order and resets the working
/// header to `backup`. Fails with `Corrupted` naming the records file when an
/// image cannot be written.
pub(crate) fn restore_tails<R: SlotRecord>(
    records: &mut RecordFile<R>,
    relinked: &[Located<R>],
    backup: RecordsHeader,
) -> Result<()> {
    let restored = relinked
        .iter()
        .rev()
        .try_for_each(|tail| records.write_slot(tail.slot, &tail.record))
        .and_then(|()| records.flush());
    records.set_header(backup);
    if let Err(err) = restored {
        error!(
            kind = R::KIND,
            versions = relinked.len(),
            error = %err,
            "coordinator.versions.corrupted"
        );
        return Err(StoreError::corrupted(
            StoreFile::Records,
            "version link rollback failed",
        ));
    }
    Ok(())
}
