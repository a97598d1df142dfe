use tracing::{debug, trace};

use super::layout::{entry_offset, get_u64, IndexHeader, INDEX_ENTRY_LEN, INDEX_HEADER_LEN};
use super::options::SyncMode;
use crate::primitives::io::FileIo;
use crate::types::{Result, SlotId, StoreError, StoreFile};

/// Dense stable-id to head-slot map.
pub struct IndexFile {
    io: Box<dyn FileIo>,
    header: IndexHeader,
    sync: SyncMode,
}

impl IndexFile {
    /// Writes an empty header (cursor 0) and syncs it.
    pub fn create(io: Box<dyn FileIo>, sync: SyncMode) -> Result<Self> {
        let header = IndexHeader::default();
        io.write_at(0, &header.encode())?;
        io.sync_all()?;
        debug!("index.create");
        Ok(Self { io, header, sync })
    }

    /// Reads the header and checks that the file covers every entry below
    /// the cursor.
    pub fn open(io: Box<dyn FileIo>, sync: SyncMode) -> Result<Self> {
        if io.len()? < INDEX_HEADER_LEN as u64 {
            return Err(StoreError::corrupted(
                StoreFile::Index,
                "index header truncated",
            ));
        }
        let mut buf = [0u8; INDEX_HEADER_LEN];
        io.read_at(0, &mut buf)?;
        let header = IndexHeader::decode(&buf)?;
        let end = entry_offset(header.cursor).ok_or(StoreError::corrupted(
            StoreFile::Index,
            "cursor exceeds the addressable file size",
        ))?;
        if io.len()? < end {
            return Err(StoreError::corrupted(
                StoreFile::Index,
                "index shorter than its cursor",
            ));
        }
        debug!(cursor = header.cursor, "index.open");
        Ok(Self { io, header, sync })
    }

    /// Cached header.
    pub fn header(&self) -> IndexHeader {
        self.header
    }

    pub(crate) fn set_header(&mut self, header: IndexHeader) {
        self.header = header;
    }

    /// Header as currently stored on disk.
    pub fn read_disk_header(&self) -> Result<IndexHeader> {
        let mut buf = [0u8; INDEX_HEADER_LEN];
        self.io.read_at(0, &mut buf)?;
        IndexHeader::decode(&buf)
    }

    /// Writes `header` to disk without touching the cached copy.
    pub fn persist_header(&self, header: &IndexHeader) -> Result<()> {
        self.io.write_at(0, &header.encode())?;
        self.flush()
    }

    /// Head slot of `id`. Ids at or past the cursor are unknown.
    pub fn lookup(&self, id: u64) -> Result<SlotId> {
        if id >= self.header.cursor {
            return Err(StoreError::IllegalArgument("unknown id"));
        }
        let mut buf = [0u8; INDEX_ENTRY_LEN];
        let offset = entry_offset(id).ok_or(StoreError::IllegalArgument("unknown id"))?;
        self.io.read_at(offset, &mut buf)?;
        Ok(SlotId(get_u64(&buf, 0..INDEX_ENTRY_LEN)))
    }

    /// Writes entries for ids `first_id..first_id + slots.len()`.
    pub fn write_entries(&self, first_id: u64, slots: &[SlotId]) -> Result<()> {
        if slots.is_empty() {
            return Ok(());
        }
        let offset = first_id
            .checked_add(slots.len() as u64)
            .and_then(|_| entry_offset(first_id))
            .ok_or(StoreError::IllegalArgument("index entry beyond addressable range"))?;
        trace!(first_id, count = slots.len(), "index.write_entries");
        let buf: Vec<u8> = slots.iter().flat_map(|slot| slot.0.to_le_bytes()).collect();
        self.io.write_at(offset, &buf)
    }

    /// Syncs the file unless syncing is off.
    pub fn flush(&self) -> Result<()> {
        match self.sync {
            SyncMode::Full => self.io.sync_all(),
            SyncMode::Off => Ok(()),
        }
    }

    /// Physical length in bytes.
    pub fn file_len(&self) -> Result<u64> {
        self.io.len()
    }
}
