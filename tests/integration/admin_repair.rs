#![allow(missing_docs)]
#![cfg(unix)]

use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;

use gridstore::{
    admin::{self, AdminError, VerifySeverity},
    storage::{substore::file_paths, NodeRecord, StoreOptions, INDEX_HEADER_LEN},
    types::{Lifetime, NodeId, Timestamp},
    Database,
};
use tempfile::tempdir;

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn populated(dir: &std::path::Path) -> TestResult {
    let db = Database::open(dir, StoreOptions::fast())?;
    let nodes = db.create_nodes(4, Lifetime::from_now())?;
    db.adjust_node_lifetime(
        &[nodes[1], nodes[1]],
        Lifetime::bounded(Timestamp(1), Timestamp(2))?,
    )?;
    let edges = db.create_edges(
        &[(nodes[0], nodes[3]), (nodes[3], nodes[0])],
        Lifetime::from_now(),
    )?;
    db.adjust_edge_lifetime(&edges[..1], Lifetime::from_now())?;
    db.close()?;
    Ok(())
}

#[test]
fn info_and_verify_on_healthy_store() -> TestResult {
    let dir = tempdir()?;
    populated(dir.path())?;

    let info = admin::info(dir.path())?;
    let nodes = info.nodes.records_header.expect("node header readable");
    assert_eq!((nodes.next_id, nodes.next_slot), (4, 6));
    assert_eq!(info.nodes.index_header.map(|h| h.cursor), Some(4));
    assert_eq!(info.edges.records_header.map(|h| h.next_slot), Some(3));
    assert!(info.nodes.problems.is_empty());

    let report = admin::verify(dir.path())?;
    assert!(report.success, "{:?}", report.findings);
    assert_eq!(report.counts.nodes_indexed, 4);
    assert_eq!(report.counts.node_versions, 6);
    assert_eq!(report.counts.edges_indexed, 2);
    assert_eq!(report.counts.edge_versions, 3);

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["success"], serde_json::Value::Bool(true));
    Ok(())
}

#[test]
fn damaged_index_entry_is_found_and_rebuilt() -> TestResult {
    let dir = tempdir()?;
    populated(dir.path())?;
    let (_, index_path) = file_paths::<NodeRecord>(dir.path());

    // Point node 2 at node 1's head.
    let index = OpenOptions::new().write(true).open(&index_path)?;
    index.write_all_at(&1u64.to_le_bytes(), (INDEX_HEADER_LEN + 2 * 8) as u64)?;
    drop(index);

    let report = admin::verify(dir.path())?;
    assert!(!report.success);
    assert!(report
        .findings
        .iter()
        .any(|f| f.severity == VerifySeverity::Error && f.kind == "nodes"));

    let rebuilt = admin::rebuild_index(dir.path())?;
    assert_eq!(rebuilt.len(), 2);
    assert_eq!(rebuilt[0].kind, "nodes");
    assert_eq!(rebuilt[0].cursor_after, 4);
    // Two non-head versions of node 1.
    assert_eq!(rebuilt[0].non_head_slots, 2);

    assert!(admin::verify(dir.path())?.success);
    let db = Database::open(dir.path(), StoreOptions::fast())?;
    assert_eq!(db.nodes().read(NodeId(2))?.id, NodeId(2));
    assert_eq!(db.nodes().read_chain(NodeId(1))?.len(), 3);
    Ok(())
}

#[test]
fn lost_index_file_is_recreated() -> TestResult {
    let dir = tempdir()?;
    populated(dir.path())?;
    let (_, index_path) = file_paths::<NodeRecord>(dir.path());
    std::fs::remove_file(&index_path)?;

    assert!(Database::open(dir.path(), StoreOptions::fast()).is_err());
    assert!(!admin::verify(dir.path())?.success);

    admin::rebuild_index(dir.path())?;
    let db = Database::open(dir.path(), StoreOptions::fast())?;
    assert_eq!(db.nodes().len(), 4);
    assert_eq!(db.edges().len(), 2);
    Ok(())
}

#[test]
fn missing_directory_is_reported() -> TestResult {
    let dir = tempdir()?;
    let missing = dir.path().join("nothing-here");
    assert!(matches!(
        admin::info(&missing),
        Err(AdminError::MissingStore(_))
    ));
    assert!(matches!(
        admin::verify(&missing),
        Err(AdminError::MissingStore(_))
    ));
    Ok(())
}
