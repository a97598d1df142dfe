//! Records file access and the slot allocator.

use std::marker::PhantomData;

use tracing::{debug, trace};

use super::layout::{slot_offset, RecordsHeader, SlotRecord, RECORDS_HEADER_LEN};
use super::options::{StoreOptions, SyncMode};
use crate::primitives::io::FileIo;
use crate::types::{Result, SlotId, StoreError, StoreFile};

/// Vacant records written per `write_at` call while growing.
const GROWTH_CHUNK_RECORDS: u64 = 256;

/// A records file of `R` plus its cached header.
///
/// The cached header is the working copy mutated by the allocator; it only
/// reaches disk through [`RecordFile::persist_header`].
pub struct RecordFile<R: SlotRecord> {
    io: Box<dyn FileIo>,
    header: RecordsHeader,
    sync: SyncMode,
    _record: PhantomData<fn() -> R>,
}

impl<R: SlotRecord> RecordFile<R> {
    /// Initialises an empty file with `capacity` vacant slots.
    pub fn create(io: Box<dyn FileIo>, capacity: u64, sync: SyncMode) -> Result<Self> {
        if slot_offset::<R>(SlotId(capacity)).is_none() {
            return Err(StoreError::IllegalArgument(
                "initial capacity exceeds the addressable file size",
            ));
        }
        let header = RecordsHeader::empty(capacity);
        io.write_at(0, &header.encode())?;
        write_vacant::<R>(io.as_ref(), SlotId(0), capacity)?;
        io.sync_all()?;
        debug!(kind = R::KIND, capacity, "records.create");
        Ok(Self {
            io,
            header,
            sync,
            _record: PhantomData,
        })
    }

    /// Loads the header and checks the file is as long as it claims.
    pub fn open(io: Box<dyn FileIo>, sync: SyncMode) -> Result<Self> {
        let mut buf = [0u8; RECORDS_HEADER_LEN];
        if io.len()? < RECORDS_HEADER_LEN as u64 {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "records header truncated",
            ));
        }
        io.read_at(0, &mut buf)?;
        let header = RecordsHeader::decode(&buf)?;
        let end = slot_offset::<R>(SlotId(header.capacity)).ok_or(StoreError::corrupted(
            StoreFile::Records,
            "capacity exceeds the addressable file size",
        ))?;
        if io.len()? < end {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "records file shorter than its capacity",
            ));
        }
        debug!(kind = R::KIND, ?header, "records.open");
        Ok(Self {
            io,
            header,
            sync,
            _record: PhantomData,
        })
    }

    /// The working header.
    pub fn header(&self) -> RecordsHeader {
        self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut RecordsHeader {
        &mut self.header
    }

    pub(crate) fn set_header(&mut self, header: RecordsHeader) {
        self.header = header;
    }

    /// Reads the header currently on disk, bypassing the cache.
    pub fn read_disk_header(&self) -> Result<RecordsHeader> {
        let mut buf = [0u8; RECORDS_HEADER_LEN];
        self.io.read_at(0, &mut buf)?;
        RecordsHeader::decode(&buf)
    }

    /// Writes `header` to disk. Does not touch the cached copy.
    pub fn persist_header(&self, header: &RecordsHeader) -> Result<()> {
        self.io.write_at(0, &header.encode())?;
        self.flush()
    }

    /// Reads the record at `slot`, which must be below the working capacity.
    pub fn read_slot(&self, slot: SlotId) -> Result<R> {
        if slot.0 >= self.header.capacity {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "slot pointer beyond capacity",
            ));
        }
        let mut buf = vec![0u8; R::SIZE];
        self.io.read_at(offset_of::<R>(slot)?, &mut buf)?;
        R::decode(&buf)
    }

    /// Overwrites the record at `slot`.
    pub fn write_slot(&self, slot: SlotId, record: &R) -> Result<()> {
        if slot.0 >= self.header.capacity {
            return Err(StoreError::IllegalArgument("slot beyond capacity"));
        }
        trace!(kind = R::KIND, slot = slot.0, "records.write_slot");
        self.io.write_at(offset_of::<R>(slot)?, &record.to_bytes())
    }

    /// Writes consecutive records starting at `first`.
    pub fn write_run(&self, first: SlotId, records: &[R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let end = first.0.checked_add(records.len() as u64);
        if end.map_or(true, |end| end > self.header.capacity) {
            return Err(StoreError::IllegalArgument("slot run beyond capacity"));
        }
        let mut buf = vec![0u8; records.len() * R::SIZE];
        for (record, chunk) in records.iter().zip(buf.chunks_exact_mut(R::SIZE)) {
            record.encode(chunk);
        }
        self.io.write_at(offset_of::<R>(first)?, &buf)
    }

    /// Makes sure `requested` more slots fit below the working capacity.
    ///
    /// When they do not, appends `ceil(growth_factor * (1 + requested))`
    /// vacant records at the slot offset of the current capacity and raises
    /// the working capacity. The on-disk header is left alone; a failed
    /// growth returns [`StoreError::ResizeFailed`] with the working header
    /// unchanged. A request whose slot count or file size would not fit in a
    /// `u64` is an [`StoreError::IllegalArgument`] and writes nothing.
    pub fn reserve(&mut self, requested: u64, opts: &StoreOptions) -> Result<()> {
        let needed = self
            .header
            .next_slot
            .checked_add(requested)
            .ok_or(StoreError::IllegalArgument("requested slot count overflows"))?;
        if needed <= self.header.capacity {
            return Ok(());
        }
        let grow = opts
            .growth_for(requested)
            .ok_or(StoreError::IllegalArgument("requested slot count overflows"))?;
        let new_capacity = self
            .header
            .capacity
            .checked_add(grow)
            .filter(|&capacity| slot_offset::<R>(SlotId(capacity)).is_some())
            .ok_or(StoreError::IllegalArgument(
                "records file would exceed the addressable size",
            ))?;
        let start = SlotId(self.header.capacity);
        debug!(
            kind = R::KIND,
            requested,
            grow,
            capacity = self.header.capacity,
            "records.grow"
        );
        write_vacant::<R>(self.io.as_ref(), start, grow).map_err(|err| match err {
            StoreError::Io(io) => StoreError::ResizeFailed(io),
            other => other,
        })?;
        self.header.capacity = new_capacity;
        Ok(())
    }

    /// Flushes record bytes when the sync mode asks for it.
    pub fn flush(&self) -> Result<()> {
        match self.sync {
            SyncMode::Full => self.io.sync_all(),
            SyncMode::Off => Ok(()),
        }
    }

    /// Physical file length in bytes.
    pub fn file_len(&self) -> Result<u64> {
        self.io.len()
    }
}

fn offset_of<R: SlotRecord>(slot: SlotId) -> Result<u64> {
    slot_offset::<R>(slot).ok_or(StoreError::IllegalArgument("slot beyond addressable range"))
}

fn write_vacant<R: SlotRecord>(io: &dyn FileIo, start: SlotId, count: u64) -> Result<()> {
    let vacant = R::vacant().to_bytes();
    let mut written = 0;
    while written < count {
        let batch = (count - written).min(GROWTH_CHUNK_RECORDS);
        let buf = vacant.repeat(batch as usize);
        io.write_at(offset_of::<R>(SlotId(start.0 + written))?, &buf)?;
        written += batch;
    }
    Ok(())
}
