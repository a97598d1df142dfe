#![forbid(unsafe_code)]
//! Identifiers, time values and the error type shared by every layer.

use std::fmt;

use time::OffsetDateTime;

/// Stable, caller-visible identifier of a node.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct NodeId(pub u64);

/// Stable, caller-visible identifier of an edge.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct EdgeId(pub u64);

/// Physical position of a fixed-size record inside a records file.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SlotId(pub u64);

/// Milliseconds since the Unix epoch.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Wall-clock time of the system, truncated to milliseconds.
    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Timestamp(u64::try_from(nanos / 1_000_000).unwrap_or(0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        NodeId(value)
    }
}

impl From<NodeId> for u64 {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

impl From<u64> for EdgeId {
    fn from(value: u64) -> Self {
        EdgeId(value)
    }
}

impl From<EdgeId> for u64 {
    fn from(value: EdgeId) -> Self {
        value.0
    }
}

/// Encoded value of an open-ended lifetime bound.
pub const LIFETIME_INFINITE: u64 = u64::MAX;

/// Validity window of one record version.
///
/// `end == None` is an infinite lifetime; on disk it is stored as
/// [`LIFETIME_INFINITE`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Lifetime {
    /// First instant at which the version is valid.
    pub begin: Timestamp,
    /// Instant at which the version stops being valid, if any.
    pub end: Option<Timestamp>,
}

impl Lifetime {
    /// Lifetime starting at `begin` and never ending.
    pub fn infinite(begin: Timestamp) -> Self {
        Self { begin, end: None }
    }

    /// Infinite lifetime starting now.
    pub fn from_now() -> Self {
        Self::infinite(Timestamp::now())
    }

    /// Bounded lifetime `[begin, end)`.
    pub fn bounded(begin: Timestamp, end: Timestamp) -> Result<Self> {
        if end.0 == LIFETIME_INFINITE {
            return Err(StoreError::IllegalArgument(
                "bounded lifetime end collides with the infinite marker",
            ));
        }
        if end < begin {
            return Err(StoreError::IllegalArgument(
                "lifetime ends before it begins",
            ));
        }
        Ok(Self {
            begin,
            end: Some(end),
        })
    }

    /// Returns true when the lifetime has no end.
    pub fn is_infinite(&self) -> bool {
        self.end.is_none()
    }

    /// Returns true when `ts` falls inside the window.
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.begin && self.end.map_or(true, |end| ts < end)
    }

    pub(crate) fn encoded_end(&self) -> u64 {
        self.end.map_or(LIFETIME_INFINITE, |end| end.0)
    }

    pub(crate) fn from_encoded(begin: u64, end: u64) -> Self {
        Self {
            begin: Timestamp(begin),
            end: if end == LIFETIME_INFINITE {
                None
            } else {
                Some(Timestamp(end))
            },
        }
    }
}

/// Identifies which file of a sub-store an error refers to.
#[derive(Copy, Clone, Eq, PartialEq, Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFile {
    /// The records file holding fixed-size version slots.
    Records,
    /// The index file mapping stable ids to head slots.
    Index,
}

impl fmt::Display for StoreFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreFile::Records => f.write_str("records"),
            StoreFile::Index => f.write_str("index"),
        }
    }
}

/// Errors surfaced by the storage engine.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Misuse of the API: bad id, empty batch, closed cursor.
    #[error("illegal argument: {0}")]
    IllegalArgument(&'static str),
    /// A write did not reach disk but left both headers consistent.
    /// Retrying the whole logical operation is safe.
    #[error("write failed: {0}")]
    WriteFailed(&'static str),
    /// A rollback failed; the named file disagrees with its header and
    /// needs out-of-band repair.
    #[error("{file} file corrupted: {reason}")]
    Corrupted {
        /// The file that can no longer be trusted.
        file: StoreFile,
        /// What went wrong.
        reason: &'static str,
    },
    /// The records file could not be grown; the header is untouched.
    #[error("records file resize failed: {0}")]
    ResizeFailed(#[source] std::io::Error),
    /// I/O failure outside the header protocol (open, read).
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true for errors that mark the store unusable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corrupted { .. })
    }

    pub(crate) fn corrupted(file: StoreFile, reason: &'static str) -> Self {
        StoreError::Corrupted { file, reason }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
