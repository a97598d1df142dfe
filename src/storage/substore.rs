//! One records file plus its index, without locking.
//!
//! [`SubStore`] owns both files and their cached headers and implements the
//! mutating operations on top of the allocator, the chain manager and the
//! commit protocol. Callers serialise access; [`super::Store`] does that
//! with a mutex.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use super::chain::{self, Located, VersionBatch};
use super::coordinator::{self, HeaderBackup};
use super::index::IndexFile;
use super::layout::{IndexHeader, RecordsHeader, SlotRecord};
use super::options::StoreOptions;
use super::records::RecordFile;
use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::{Lifetime, Result, SlotId, StoreError, StoreFile, Timestamp};

/// Paths of the two files backing a sub-store of `R` inside `dir`.
pub fn file_paths<R: SlotRecord>(dir: &Path) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{}.records", R::KIND)),
        dir.join(format!("{}.heads", R::KIND)),
    )
}

/// Records file and index of one record shape, with their cached headers.
pub struct SubStore<R: SlotRecord> {
    records: RecordFile<R>,
    index: IndexFile,
    opts: StoreOptions,
    poisoned: Option<StoreFile>,
}

impl<R: SlotRecord> SubStore<R> {
    /// Opens the sub-store in `dir`, creating both files if neither exists.
    pub fn open(dir: &Path, opts: StoreOptions) -> Result<Self> {
        opts.validate()?;
        let (records_path, index_path) = file_paths::<R>(dir);
        match (records_path.exists(), index_path.exists()) {
            (false, false) => {
                info!(kind = R::KIND, dir = %dir.display(), "substore.create");
                Self::create_with_io(
                    Box::new(StdFileIo::create_new(&records_path)?),
                    Box::new(StdFileIo::create_new(&index_path)?),
                    opts,
                )
            }
            (true, true) => Self::open_with_io(
                Box::new(StdFileIo::open(&records_path)?),
                Box::new(StdFileIo::open(&index_path)?),
                opts,
            ),
            (true, false) => Err(StoreError::corrupted(
                StoreFile::Index,
                "index file missing",
            )),
            (false, true) => Err(StoreError::corrupted(
                StoreFile::Records,
                "records file missing",
            )),
        }
    }

    /// Initialises empty files behind the given handles.
    pub fn create_with_io(
        records: Box<dyn FileIo>,
        index: Box<dyn FileIo>,
        opts: StoreOptions,
    ) -> Result<Self> {
        opts.validate()?;
        let records = RecordFile::create(records, opts.initial_capacity, opts.sync_mode)?;
        let index = IndexFile::create(index, opts.sync_mode)?;
        Ok(Self {
            records,
            index,
            opts,
            poisoned: None,
        })
    }

    /// Opens existing files and checks that their headers agree.
    pub fn open_with_io(
        records: Box<dyn FileIo>,
        index: Box<dyn FileIo>,
        opts: StoreOptions,
    ) -> Result<Self> {
        opts.validate()?;
        let records = RecordFile::open(records, opts.sync_mode)?;
        let index = IndexFile::open(index, opts.sync_mode)?;
        if records.header().next_id != index.header().cursor {
            return Err(StoreError::corrupted(
                StoreFile::Index,
                "index cursor disagrees with the records header",
            ));
        }
        debug!(
            kind = R::KIND,
            next_id = records.header().next_id,
            next_slot = records.header().next_slot,
            "substore.open"
        );
        Ok(Self {
            records,
            index,
            opts,
            poisoned: None,
        })
    }

    /// Options this sub-store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.opts
    }

    /// Cached records header.
    pub fn records_header(&self) -> RecordsHeader {
        self.records.header()
    }

    /// Cached index header.
    pub fn index_header(&self) -> IndexHeader {
        self.index.header()
    }

    pub(crate) fn records(&self) -> &RecordFile<R> {
        &self.records
    }

    /// The file that was declared corrupted, if any.
    pub fn poisoned(&self) -> Option<StoreFile> {
        self.poisoned
    }

    /// Number of stable ids handed out.
    pub fn len(&self) -> u64 {
        self.records.header().next_id
    }

    /// True when no id has been issued yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.poisoned {
            Some(file) => Err(StoreError::corrupted(
                file,
                "store was declared corrupted",
            )),
            None => Ok(()),
        }
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(StoreError::Corrupted { file, reason }) = &result {
            error!(kind = R::KIND, %file, reason, "substore.poisoned");
            self.poisoned = Some(*file);
        }
        result
    }

    /// Appends `count` first versions built by `build(id, creation_time)`
    /// and commits them as one batch. Returns the new stable ids.
    pub fn create_batch(
        &mut self,
        count: u64,
        build: impl FnMut(u64, Timestamp) -> R,
    ) -> Result<Vec<u64>> {
        self.ensure_writable()?;
        if count == 0 {
            return Err(StoreError::IllegalArgument("cannot create zero records"));
        }
        let result = self.create_batch_inner(count, build);
        self.track(result)
    }

    fn create_batch_inner(
        &mut self,
        count: u64,
        mut build: impl FnMut(u64, Timestamp) -> R,
    ) -> Result<Vec<u64>> {
        let backup = HeaderBackup::capture(&self.records, &self.index);
        self.records.reserve(count, &self.opts)?;

        // reserve() checked next_slot + count, and next_id <= next_slot.
        let first_id = backup.records.next_id;
        let first_slot = backup.records.next_slot;
        let ids: Vec<u64> = (first_id..first_id + count).collect();
        let slots: Vec<SlotId> = (first_slot..first_slot + count).map(SlotId).collect();
        let batch: Vec<R> = ids.iter().map(|&id| build(id, Timestamp::now())).collect();

        let written = self
            .records
            .write_run(SlotId(first_slot), &batch)
            .and_then(|()| self.index.write_entries(first_id, &slots))
            .and_then(|()| self.records.flush())
            .and_then(|()| self.index.flush());
        if let Err(err) = written {
            backup.restore(&mut self.records, &mut self.index);
            debug!(kind = R::KIND, error = %err, "substore.create.write_failed");
            return Err(chain::write_failure(err));
        }

        let header = self.records.header_mut();
        header.next_id += count;
        header.next_slot += count;
        let cursor = header.next_id;
        self.index.set_header(IndexHeader { cursor });

        coordinator::commit_batch(
            &mut self.records,
            &mut self.index,
            backup,
            self.opts.header_retry,
        )?;
        debug!(kind = R::KIND, first_id, count, "substore.create.commit");
        Ok(ids)
    }

    /// Gives every id in `ids` a new tail version carrying `lifetime`.
    ///
    /// All ids are checked before anything is written, and the versions are
    /// committed together: on any error other than `Corrupted` no id has a
    /// new version and the headers are as before the call. An id listed
    /// twice gets two consecutive versions.
    pub fn adjust_lifetime(&mut self, ids: &[u64], lifetime: Lifetime) -> Result<()> {
        self.ensure_writable()?;
        if ids.is_empty() {
            return Err(StoreError::IllegalArgument("no ids given"));
        }
        let known = self.index.header().cursor;
        if ids.iter().any(|&id| id >= known) {
            return Err(StoreError::IllegalArgument("unknown id"));
        }
        let result = self.adjust_lifetime_inner(ids, lifetime);
        self.track(result)
    }

    fn adjust_lifetime_inner(&mut self, ids: &[u64], lifetime: Lifetime) -> Result<()> {
        let heads = ids
            .iter()
            .map(|&id| self.index.lookup(id))
            .collect::<Result<Vec<SlotId>>>()?;
        let mut batch = VersionBatch::begin(&mut self.records, &self.opts, ids.len() as u64)?;
        for (&id, &head) in ids.iter().zip(&heads) {
            batch.append(id, head, lifetime)?;
        }
        batch.commit()?;
        debug!(kind = R::KIND, count = ids.len(), "substore.adjust_lifetime");
        Ok(())
    }

    /// The head version of `id`.
    pub fn read_head(&self, id: u64) -> Result<Located<R>> {
        let slot = self.index.lookup(id)?;
        let record = chain::read_version(&self.records, slot, id)?;
        Ok(Located { slot, record })
    }

    /// The tail version of `id`.
    pub fn read_latest(&self, id: u64) -> Result<Located<R>> {
        let slot = self.index.lookup(id)?;
        chain::last_version(&self.records, id, slot)
    }

    /// Every version of `id`, oldest first.
    pub fn read_chain(&self, id: u64) -> Result<Vec<Located<R>>> {
        let slot = self.index.lookup(id)?;
        chain::read_chain(&self.records, id, slot)
    }

    /// Flushes both files.
    pub fn flush(&self) -> Result<()> {
        self.records.flush()?;
        self.index.flush()
    }
}
