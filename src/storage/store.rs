use std::path::Path;

use parking_lot::Mutex;
use tracing::debug;

use super::cursor::{ScanCursor, VersionCursor};
use super::edge::EdgeRecord;
use super::layout::{IndexHeader, RecordsHeader, SlotRecord};
use super::node::NodeRecord;
use super::options::StoreOptions;
use super::substore::SubStore;
use crate::primitives::io::FileIo;
use crate::types::{EdgeId, Lifetime, NodeId, Result, StoreFile};

/// A sub-store of `R` behind the store-wide lock.
///
/// Every public operation takes the lock for its whole duration and releases
/// it on every exit path. Open cursors hold the lock too, so calling a
/// mutating method from the thread that holds an open cursor blocks forever.
pub struct Store<R: SlotRecord> {
    inner: Mutex<SubStore<R>>,
}

/// Node sub-store.
pub type NodeStore = Store<NodeRecord>;
/// Edge sub-store.
pub type EdgeStore = Store<EdgeRecord>;

impl<R: SlotRecord> Store<R> {
    /// Opens the store kept in `dir`, creating the directory and both files
    /// when they do not exist yet.
    pub fn open(dir: impl AsRef<Path>, opts: StoreOptions) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Ok(Self::from_substore(SubStore::open(dir, opts)?))
    }

    /// Creates a store on caller-provided, empty file handles.
    pub fn create_with_io(
        records: Box<dyn FileIo>,
        index: Box<dyn FileIo>,
        opts: StoreOptions,
    ) -> Result<Self> {
        Ok(Self::from_substore(SubStore::create_with_io(
            records, index, opts,
        )?))
    }

    /// Opens a store on caller-provided handles of existing files.
    pub fn open_with_io(
        records: Box<dyn FileIo>,
        index: Box<dyn FileIo>,
        opts: StoreOptions,
    ) -> Result<Self> {
        Ok(Self::from_substore(SubStore::open_with_io(
            records, index, opts,
        )?))
    }

    fn from_substore(inner: SubStore<R>) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, SubStore<R>> {
        self.inner.lock()
    }

    /// Creates a new tail version with `lifetime` for each id.
    pub fn adjust_lifetime(&self, ids: &[R::Id], lifetime: Lifetime) -> Result<()> {
        let raw: Vec<u64> = ids.iter().map(|&id| id.into()).collect();
        self.lock().adjust_lifetime(&raw, lifetime)
    }

    /// Head (oldest) version of `id`.
    pub fn read(&self, id: R::Id) -> Result<R> {
        Ok(self.lock().read_head(id.into())?.record)
    }

    /// Tail (newest) version of `id`.
    pub fn read_latest(&self, id: R::Id) -> Result<R> {
        Ok(self.lock().read_latest(id.into())?.record)
    }

    /// All versions of `id`, oldest first.
    pub fn read_chain(&self, id: R::Id) -> Result<Vec<R>> {
        Ok(self
            .lock()
            .read_chain(id.into())?
            .into_iter()
            .map(|located| located.record)
            .collect())
    }

    /// Highest id handed out so far.
    pub fn last_id(&self) -> Option<R::Id> {
        self.lock().len().checked_sub(1).map(R::Id::from)
    }

    /// Number of ids handed out.
    pub fn len(&self) -> u64 {
        self.lock().len()
    }

    /// True when no id has been issued yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached header values.
    pub fn headers(&self) -> (RecordsHeader, IndexHeader) {
        let inner = self.lock();
        (inner.records_header(), inner.index_header())
    }

    /// The file this store declared corrupted, if any. A poisoned store
    /// refuses all further writes.
    pub fn poisoned(&self) -> Option<StoreFile> {
        self.lock().poisoned()
    }

    /// A closed cursor over ids `0..len()` as of now.
    pub fn full_scan(&self) -> ScanCursor<'_, R> {
        let max = self.len();
        ScanCursor::new(&self.inner, max)
    }

    /// A closed cursor over the versions of `id`. Unknown ids are reported
    /// by [`VersionCursor::open`].
    pub fn versions(&self, id: R::Id) -> VersionCursor<'_, R> {
        VersionCursor::new(&self.inner, id.into())
    }

    /// Flushes both files and drops the handle.
    pub fn close(self) -> Result<()> {
        let inner = self.inner.into_inner();
        inner.flush()?;
        debug!(kind = R::KIND, next_id = inner.len(), "store.close");
        Ok(())
    }
}

impl Store<NodeRecord> {
    /// Creates `count` nodes with `lifetime`, returning their ids in order.
    pub fn create(&self, count: u64, lifetime: Lifetime) -> Result<Vec<NodeId>> {
        let ids = self
            .lock()
            .create_batch(count, |id, now| NodeRecord::new(NodeId(id), now, lifetime))?;
        Ok(ids.into_iter().map(NodeId).collect())
    }
}

impl Store<EdgeRecord> {
    /// Creates one edge per `(head, tail)` pair. Endpoints are not checked
    /// here; [`crate::db::Database::create_edges`] does that.
    pub fn create(
        &self,
        endpoints: &[(NodeId, NodeId)],
        lifetime: Lifetime,
    ) -> Result<Vec<EdgeId>> {
        let mut pairs = endpoints.iter().copied();
        let ids = self.lock().create_batch(endpoints.len() as u64, |id, now| {
            // create_batch builds exactly one record per pair.
            let (head, tail) = pairs.next().unwrap_or((NodeId(0), NodeId(0)));
            EdgeRecord::new(EdgeId(id), head, tail, now, lifetime)
        })?;
        Ok(ids.into_iter().map(EdgeId).collect())
    }
}
