use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::primitives::io::{FileIo, StdFileIo};
use crate::storage::layout::{entry_offset, get_u64, slot_offset};
use crate::storage::substore::file_paths;
use crate::storage::{
    IndexHeader, RecordsHeader, SlotRecord, INDEX_ENTRY_LEN, INDEX_HEADER_LEN,
    RECORDS_HEADER_LEN,
};
use crate::types::{Result as StoreResult, SlotId, StoreError, StoreFile};

use crate::admin::error::Result;

/// Read-only view of a sub-store's files that does no validation on open,
/// so damaged stores can still be inspected.
pub(crate) struct RawFiles<R: SlotRecord> {
    pub records_path: PathBuf,
    pub index_path: PathBuf,
    pub records: Option<StdFileIo>,
    pub index: Option<StdFileIo>,
    _record: PhantomData<fn() -> R>,
}

impl<R: SlotRecord> RawFiles<R> {
    pub fn open(dir: &Path) -> Result<Self> {
        let (records_path, index_path) = file_paths::<R>(dir);
        let records = open_if_exists(&records_path)?;
        let index = open_if_exists(&index_path)?;
        Ok(Self {
            records_path,
            index_path,
            records,
            index,
            _record: PhantomData,
        })
    }

    pub fn is_absent(&self) -> bool {
        self.records.is_none() && self.index.is_none()
    }

    pub fn records_len(&self) -> StoreResult<Option<u64>> {
        self.records.as_ref().map(|io| io.len()).transpose()
    }

    pub fn index_len(&self) -> StoreResult<Option<u64>> {
        self.index.as_ref().map(|io| io.len()).transpose()
    }

    pub fn records_header(&self) -> StoreResult<RecordsHeader> {
        let io = self.records.as_ref().ok_or(StoreError::corrupted(
            StoreFile::Records,
            "records file missing",
        ))?;
        if io.len()? < RECORDS_HEADER_LEN as u64 {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "records header truncated",
            ));
        }
        let mut buf = [0u8; RECORDS_HEADER_LEN];
        io.read_at(0, &mut buf)?;
        RecordsHeader::decode(&buf)
    }

    pub fn index_header(&self) -> StoreResult<IndexHeader> {
        let io = self.index.as_ref().ok_or(StoreError::corrupted(
            StoreFile::Index,
            "index file missing",
        ))?;
        if io.len()? < INDEX_HEADER_LEN as u64 {
            return Err(StoreError::corrupted(
                StoreFile::Index,
                "index header truncated",
            ));
        }
        let mut buf = [0u8; INDEX_HEADER_LEN];
        io.read_at(0, &mut buf)?;
        IndexHeader::decode(&buf)
    }

    /// Number of whole slots physically present in the records file.
    pub fn physical_slots(&self) -> StoreResult<u64> {
        let len = self.records_len()?.unwrap_or(0);
        Ok(len.saturating_sub(RECORDS_HEADER_LEN as u64) / R::SIZE as u64)
    }

    pub fn read_slot(&self, slot: SlotId) -> StoreResult<R> {
        let io = self.records.as_ref().ok_or(StoreError::corrupted(
            StoreFile::Records,
            "records file missing",
        ))?;
        let offset = slot_offset::<R>(slot).ok_or(StoreError::corrupted(
            StoreFile::Records,
            "slot pointer beyond addressable range",
        ))?;
        let mut buf = vec![0u8; R::SIZE];
        io.read_at(offset, &mut buf)?;
        R::decode(&buf)
    }

    pub fn read_entry(&self, id: u64) -> StoreResult<SlotId> {
        let io = self.index.as_ref().ok_or(StoreError::corrupted(
            StoreFile::Index,
            "index file missing",
        ))?;
        let offset = entry_offset(id).ok_or(StoreError::corrupted(
            StoreFile::Index,
            "index entry beyond addressable range",
        ))?;
        let mut buf = [0u8; INDEX_ENTRY_LEN];
        io.read_at(offset, &mut buf)?;
        Ok(SlotId(get_u64(&buf, 0..INDEX_ENTRY_LEN)))
    }
}

fn open_if_exists(path: &Path) -> Result<Option<StdFileIo>> {
    if path.exists() {
        Ok(Some(StdFileIo::open(path)?))
    } else {
        Ok(None)
    }
}
