#![forbid(unsafe_code)]

//! Offline inspection and repair of store directories.
//!
//! These functions read the files directly instead of going through
//! [`crate::storage::Store`], so they work on stores the engine refuses to
//! open. None of them take the store lock; run them on closed stores.

mod error;
mod info;
mod repair;
mod util;
mod verify;

pub use error::{AdminError, Result};
pub use info::{info, InfoReport, SubStoreInfo};
pub use repair::{rebuild_index, RebuildReport};
pub use verify::{verify, VerifyCounts, VerifyFinding, VerifyReport, VerifySeverity};
