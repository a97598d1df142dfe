use std::path::Path;

use serde::Serialize;

use crate::admin::error::{AdminError, Result};
use crate::admin::util::RawFiles;
use crate::storage::{EdgeRecord, IndexHeader, NodeRecord, RecordsHeader, SlotRecord};

/// Header values and file sizes of one sub-store.
#[derive(Debug, Clone, Serialize)]
pub struct SubStoreInfo {
    /// `nodes` or `edges`.
    pub kind: &'static str,
    /// Path of the records file.
    pub records_path: String,
    /// Path of the index file.
    pub index_path: String,
    /// `None` when the file is missing.
    pub records_size_bytes: Option<u64>,
    /// `None` when the file is missing.
    pub index_size_bytes: Option<u64>,
    /// Encoded size of one slot.
    pub record_size: usize,
    /// `None` when missing or undecodable.
    pub records_header: Option<RecordsHeader>,
    /// `None` when missing or undecodable.
    pub index_header: Option<IndexHeader>,
    /// Decode errors for either header.
    pub problems: Vec<String>,
}

/// Output of [`info`].
#[derive(Debug, Clone, Serialize)]
pub struct InfoReport {
    /// Directory that was inspected.
    pub dir: String,
    /// Node sub-store.
    pub nodes: SubStoreInfo,
    /// Edge sub-store.
    pub edges: SubStoreInfo,
}

/// Reads headers and sizes without validating or locking anything.
pub fn info(dir: impl AsRef<Path>) -> Result<InfoReport> {
    let dir = dir.as_ref();
    let nodes = RawFiles::<NodeRecord>::open(dir)?;
    let edges = RawFiles::<EdgeRecord>::open(dir)?;
    if nodes.is_absent() && edges.is_absent() {
        return Err(AdminError::missing_store(dir));
    }
    Ok(InfoReport {
        dir: dir.display().to_string(),
        nodes: describe(&nodes)?,
        edges: describe(&edges)?,
    })
}

fn describe<R: SlotRecord>(raw: &RawFiles<R>) -> Result<SubStoreInfo> {
    let mut problems = Vec::new();
    let records_header = raw
        .records
        .as_ref()
        .and_then(|_| raw.records_header().map_err(|err| problems.push(err.to_string())).ok());
    let index_header = raw
        .index
        .as_ref()
        .and_then(|_| raw.index_header().map_err(|err| problems.push(err.to_string())).ok());
    Ok(SubStoreInfo {
        kind: R::KIND,
        records_path: raw.records_path.display().to_string(),
        index_path: raw.index_path.display().to_string(),
        records_size_bytes: raw.records_len()?,
        index_size_bytes: raw.index_len()?,
        record_size: R::SIZE,
        records_header,
        index_header,
        problems,
    })
}
