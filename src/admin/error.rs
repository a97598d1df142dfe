use std::path::{Path, PathBuf};

use crate::types::StoreError;
use thiserror::Error;

/// Error type for administrative operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// No store files were found in the directory.
    #[error("store not found: {0}")]
    MissingStore(PathBuf),
    /// The store is too damaged for the requested operation.
    #[error("{0}")]
    Message(String),
    /// Storage engine error.
    #[error(transparent)]
    Core(#[from] StoreError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    pub(crate) fn missing_store(path: impl AsRef<Path>) -> Self {
        AdminError::MissingStore(path.as_ref().to_path_buf())
    }
}
