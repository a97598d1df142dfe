//! Cursors that hold the store lock while open.

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use super::chain::{self, Located};
use super::layout::SlotRecord;
use super::substore::SubStore;
use crate::types::{Result, StoreError, StoreFile};

/// Walks ids `0..max` where `max` is fixed when the cursor is made.
///
/// Starts closed. [`open`](Self::open) takes the store lock, which is held
/// until [`close`](Self::close) or drop. Ids created after the cursor was
/// made are not visited.
pub struct ScanCursor<'a, R: SlotRecord> {
    lock: &'a Mutex<SubStore<R>>,
    guard: Option<MutexGuard<'a, SubStore<R>>>,
    current: u64,
    max: u64,
    started: bool,
}

impl<'a, R: SlotRecord> ScanCursor<'a, R> {
    pub(crate) fn new(lock: &'a Mutex<SubStore<R>>, max: u64) -> Self {
        Self {
            lock,
            guard: None,
            current: 0,
            max,
            started: false,
        }
    }

    /// Acquires the store lock. Opening an open cursor does nothing.
    pub fn open(&mut self) {
        if self.guard.is_none() {
            self.guard = Some(self.lock.lock());
            trace!(kind = R::KIND, max = self.max, "cursor.scan.open");
        }
    }

    /// Whether the cursor currently holds the lock.
    pub fn is_open(&self) -> bool {
        self.guard.is_some()
    }

    /// Advances to the next id. The first call positions on id 0. Returns
    /// false once the range is exhausted.
    pub fn next(&mut self) -> bool {
        if self.started {
            self.current = self.current.saturating_add(1).min(self.max);
        }
        self.started = true;
        self.current < self.max
    }

    /// Id the cursor is positioned on.
    pub fn current(&self) -> Option<R::Id> {
        (self.started && self.current < self.max).then(|| R::Id::from(self.current))
    }

    /// Head version of the current id.
    pub fn read(&self) -> Result<R> {
        let guard = self
            .guard
            .as_ref()
            .ok_or(StoreError::IllegalArgument("cursor is closed"))?;
        if !self.started || self.current >= self.max {
            return Err(StoreError::IllegalArgument("cursor is not positioned"));
        }
        Ok(guard.read_head(self.current)?.record)
    }

    /// Releases the store lock.
    pub fn close(&mut self) {
        if self.guard.take().is_some() {
            trace!(kind = R::KIND, "cursor.scan.close");
        }
    }
}

/// Walks one id's versions from head to tail while holding the store lock.
///
/// Starts closed like [`ScanCursor`]. [`open`](Self::open) takes the lock and
/// positions on the head version; [`close`](Self::close) or drop releases it.
pub struct VersionCursor<'a, R: SlotRecord> {
    lock: &'a Mutex<SubStore<R>>,
    guard: Option<MutexGuard<'a, SubStore<R>>>,
    id: u64,
    current: Option<Located<R>>,
}

impl<'a, R: SlotRecord> VersionCursor<'a, R> {
    pub(crate) fn new(lock: &'a Mutex<SubStore<R>>, id: u64) -> Self {
        Self {
            lock,
            guard: None,
            id,
            current: None,
        }
    }

    /// Acquires the store lock and positions on the head version. Unknown
    /// ids fail with `IllegalArgument` and leave the cursor closed. Opening
    /// an open cursor does nothing.
    pub fn open(&mut self) -> Result<()> {
        if self.guard.is_some() {
            return Ok(());
        }
        let guard = self.lock.lock();
        self.current = Some(guard.read_head(self.id)?);
        self.guard = Some(guard);
        trace!(kind = R::KIND, id = self.id, "cursor.versions.open");
        Ok(())
    }

    /// Returns true while the cursor holds the store lock.
    pub fn is_open(&self) -> bool {
        self.guard.is_some()
    }

    /// Moves to the next newer version. Returns false at the tail, leaving
    /// the cursor on it.
    pub fn next(&mut self) -> Result<bool> {
        let (Some(guard), Some(current)) = (self.guard.as_ref(), self.current.as_ref()) else {
            return Err(StoreError::IllegalArgument("cursor is closed"));
        };
        let Some(next) = current.record.links().next else {
            return Ok(false);
        };
        let record = chain::read_version(guard.records(), next, self.id)?;
        if record.links().prev != Some(current.slot) {
            return Err(StoreError::corrupted(
                StoreFile::Records,
                "version chain back-link mismatch",
            ));
        }
        self.current = Some(Located { slot: next, record });
        Ok(true)
    }

    /// The version the cursor is on.
    pub fn read(&self) -> Result<&R> {
        match (&self.guard, &self.current) {
            (Some(_), Some(current)) => Ok(&current.record),
            _ => Err(StoreError::IllegalArgument("cursor is closed")),
        }
    }

    /// Releases the store lock. Reopening starts over at the head.
    pub fn close(&mut self) {
        self.current = None;
        if self.guard.take().is_some() {
            trace!(kind = R::KIND, id = self.id, "cursor.versions.close");
        }
    }
}
