//! Low-level primitives for building the storage engine.

/// Positioned file I/O and write-fault injection.
///
/// Interfaces for reading and writing at absolute offsets.
pub mod io;
