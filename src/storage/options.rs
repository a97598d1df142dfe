use crate::types::{Result, StoreError};

/// Smallest growth factor accepted by [`StoreOptions::validate`].
pub const MIN_GROWTH_FACTOR: f64 = 1.7;
/// Slots allocated when a store is created.
pub const DEFAULT_CAPACITY: u64 = 1024;
/// Total attempts for one header write.
pub const DEFAULT_HEADER_ATTEMPTS: u32 = 100;

/// When the store asks the OS to flush file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every protocol phase.
    Full,
    /// Leave flushing to the OS.
    Off,
}

/// Bounded retry policy for header writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero is treated as one.
    pub attempts: u32,
}

impl RetryPolicy {
    /// Policy with `attempts` total tries.
    pub fn new(attempts: u32) -> Self {
        Self { attempts }
    }

    /// Runs `op` until it succeeds or the attempts are used up, returning the
    /// last error.
    pub fn run<T>(&self, mut op: impl FnMut(u32) -> Result<T>) -> Result<T> {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 >= attempts => return Err(err),
                Err(_) => attempt += 1,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_HEADER_ATTEMPTS)
    }
}

/// Options supplied when opening or creating a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Capacity, in slots, of a freshly created records file.
    pub initial_capacity: u64,
    /// Over-allocation factor applied when the records file grows.
    pub growth_factor: f64,
    /// Retry policy for records and index header writes and their rollbacks.
    pub header_retry: RetryPolicy,
    /// Flush behaviour.
    pub sync_mode: SyncMode,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            growth_factor: MIN_GROWTH_FACTOR,
            header_retry: RetryPolicy::default(),
            sync_mode: SyncMode::Full,
        }
    }
}

impl StoreOptions {
    /// Every protocol phase is fsynced.
    pub fn durable() -> Self {
        Self::default()
    }

    /// No fsync; the OS decides when data reaches disk. Useful for tests and
    /// bulk loads.
    pub fn fast() -> Self {
        Self {
            sync_mode: SyncMode::Off,
            ..Self::default()
        }
    }

    /// Slots allocated when a records file is created.
    pub fn with_initial_capacity(mut self, capacity: u64) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Multiplier applied to `1 + requested` when the file grows.
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Retry policy for header writes.
    pub fn with_header_retry(mut self, policy: RetryPolicy) -> Self {
        self.header_retry = policy;
        self
    }

    /// Durability of protocol phases.
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Rejects option values the allocator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.growth_factor.is_finite() || self.growth_factor < MIN_GROWTH_FACTOR {
            return Err(StoreError::IllegalArgument(
                "growth factor must be at least 1.7",
            ));
        }
        if self.initial_capacity == 0 {
            return Err(StoreError::IllegalArgument(
                "initial capacity must be positive",
            ));
        }
        Ok(())
    }

    /// Number of vacant slots to append when `requested` more are needed,
    /// or `None` when that count does not fit in a `u64`.
    pub(crate) fn growth_for(&self, requested: u64) -> Option<u64> {
        let slots = requested.checked_add(1)?;
        let grow = (self.growth_factor * slots as f64).ceil();
        (grow < u64::MAX as f64).then_some(grow as u64)
    }
}
