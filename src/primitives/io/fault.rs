//! Deterministic write-fault injection for [`FileIo`].
//!
//! [`FaultyIo`] wraps another [`FileIo`] and fails selected writes or syncs
//! according to rules armed on a shared [`FaultPlan`]. The plan can be armed
//! after the wrapper was handed to a store, which lets a test fail exactly
//! one phase of the header protocol.
//!
//! ```ignore
//! let plan = FaultPlan::default();
//! let index = FaultyIo::new(StdFileIo::open(path)?, INDEX_HEADER_LEN as u64, plan.clone());
//! plan.arm(FaultRule::header_writes().times(100));
//! ```

use std::io::{self, ErrorKind};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::FileIo;
use crate::types::{Result, StoreError};

/// Which operations a rule matches.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultTarget {
    /// Writes that touch the header region.
    HeaderWrites,
    /// Writes that start past the header region.
    BodyWrites,
    /// `sync_all` calls.
    Syncs,
}

/// A single armed fault.
#[derive(Clone, Debug)]
pub struct FaultRule {
    target: FaultTarget,
    skip: u64,
    remaining: Option<u64>,
}

impl FaultRule {
    /// Matches writes inside the header region.
    pub fn header_writes() -> Self {
        Self::new(FaultTarget::HeaderWrites)
    }

    /// Matches writes outside the header region.
    pub fn body_writes() -> Self {
        Self::new(FaultTarget::BodyWrites)
    }

    /// Matches sync calls.
    pub fn syncs() -> Self {
        Self::new(FaultTarget::Syncs)
    }

    fn new(target: FaultTarget) -> Self {
        Self {
            target,
            skip: 0,
            remaining: None,
        }
    }

    /// Lets the first `n` matching operations through before failing.
    pub fn after(mut self, n: u64) -> Self {
        self.skip = n;
        self
    }

    /// Fails `n` matching operations, then disarms. Without this the rule
    /// fails forever.
    pub fn times(mut self, n: u64) -> Self {
        self.remaining = Some(n);
        self
    }
}

#[derive(Default)]
struct PlanState {
    rules: Vec<FaultRule>,
    injected: u64,
}

/// Shared, cloneable set of armed fault rules.
#[derive(Clone, Default)]
pub struct FaultPlan {
    inner: Arc<Mutex<PlanState>>,
}

impl FaultPlan {
    /// Adds a rule.
    pub fn arm(&self, rule: FaultRule) {
        self.inner.lock().rules.push(rule);
    }

    /// Removes every rule.
    pub fn clear(&self) {
        self.inner.lock().rules.clear();
    }

    /// Number of faults injected so far.
    pub fn injected(&self) -> u64 {
        self.inner.lock().injected
    }

    fn should_fail(&self, target: FaultTarget) -> bool {
        let mut state = self.inner.lock();
        let mut fire = false;
        for rule in state.rules.iter_mut().filter(|rule| rule.target == target) {
            if rule.remaining == Some(0) {
                continue;
            }
            if rule.skip > 0 {
                rule.skip -= 1;
                continue;
            }
            if let Some(left) = rule.remaining.as_mut() {
                *left -= 1;
            }
            fire = true;
            break;
        }
        if fire {
            state.injected += 1;
        }
        fire
    }
}

/// [`FileIo`] wrapper that fails operations selected by a [`FaultPlan`].
pub struct FaultyIo<F: FileIo> {
    inner: F,
    header_len: u64,
    plan: FaultPlan,
}

impl<F: FileIo> FaultyIo<F> {
    /// Wraps `inner`; writes below `header_len` count as header writes.
    pub fn new(inner: F, header_len: u64, plan: FaultPlan) -> Self {
        Self {
            inner,
            header_len,
            plan,
        }
    }

    fn injected_error(what: &'static str) -> StoreError {
        StoreError::Io(io::Error::new(ErrorKind::Other, what))
    }
}

impl<F: FileIo> FileIo for FaultyIo<F> {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        self.inner.read_at(off, dst)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        let target = if off < self.header_len {
            FaultTarget::HeaderWrites
        } else {
            FaultTarget::BodyWrites
        };
        if self.plan.should_fail(target) {
            debug!(off, len = src.len(), ?target, "fault.write.injected");
            return Err(Self::injected_error("injected write fault"));
        }
        self.inner.write_at(off, src)
    }

    fn sync_all(&self) -> Result<()> {
        if self.plan.should_fail(FaultTarget::Syncs) {
            debug!("fault.sync.injected");
            return Err(Self::injected_error("injected sync fault"));
        }
        self.inner.sync_all()
    }

    fn len(&self) -> Result<u64> {
        self.inner.len()
    }
}
