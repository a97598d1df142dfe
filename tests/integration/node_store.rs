#![allow(missing_docs)]

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use gridstore::{
    storage::{substore::file_paths, NodeRecord, NodeStore, SlotRecord, StoreOptions},
    types::{Lifetime, NodeId, Result, StoreError, StoreFile, Timestamp},
};
use tempfile::tempdir;

fn bounded() -> Lifetime {
    Lifetime::bounded(Timestamp(1_000), Timestamp(2_000)).unwrap()
}

#[test]
fn create_adjust_and_read_chain() -> Result<()> {
    let dir = tempdir()?;
    let store = NodeStore::open(dir.path(), StoreOptions::fast())?;

    let ids = store.create(3, Lifetime::from_now())?;
    assert_eq!(ids, vec![NodeId(0), NodeId(1), NodeId(2)]);
    let head = store.read(NodeId(0))?;
    assert!(head.links.next.is_none());
    assert!(head.lifetime.is_infinite());

    store.adjust_lifetime(&[NodeId(0)], bounded())?;
    let chain = store.read_chain(NodeId(0))?;
    assert_eq!(chain.len(), 2);
    assert!(chain[0].links.next.is_some());
    assert!(chain[0].links.prev.is_none());
    assert!(chain[1].links.prev.is_some());
    assert!(chain[1].links.next.is_none());
    assert!(chain[0].lifetime.is_infinite());
    assert_eq!(chain[1].lifetime, bounded());
    assert_eq!(chain[1].id, NodeId(0));

    // The head is untouched apart from its successor link.
    assert_eq!(store.read(NodeId(0))?.lifetime, chain[0].lifetime);
    assert_eq!(store.read_latest(NodeId(0))?, chain[1]);

    let (records, index) = store.headers();
    assert_eq!(records.next_id, 3);
    assert_eq!(records.next_slot, 4);
    assert_eq!(index.cursor, 3);
    Ok(())
}

#[test]
fn zero_count_and_unknown_ids_are_illegal() -> Result<()> {
    let dir = tempdir()?;
    let store = NodeStore::open(dir.path(), StoreOptions::fast())?;
    store.create(2, Lifetime::from_now())?;
    let before = store.headers();

    assert!(matches!(
        store.create(0, Lifetime::from_now()),
        Err(StoreError::IllegalArgument(_))
    ));
    assert!(matches!(
        store.adjust_lifetime(&[NodeId(0), NodeId(9)], bounded()),
        Err(StoreError::IllegalArgument(_))
    ));
    assert!(matches!(
        store.adjust_lifetime(&[], bounded()),
        Err(StoreError::IllegalArgument(_))
    ));
    assert!(matches!(
        store.read(NodeId(2)),
        Err(StoreError::IllegalArgument(_))
    ));

    assert_eq!(store.headers(), before);
    // Validation happens before any version is written.
    assert_eq!(store.read_chain(NodeId(0))?.len(), 1);
    Ok(())
}

#[test]
fn reopen_without_writes_is_identical() -> Result<()> {
    let dir = tempdir()?;
    let (headers, chains) = {
        let store = NodeStore::open(dir.path(), StoreOptions::durable())?;
        store.create(4, Lifetime::from_now())?;
        store.adjust_lifetime(&[NodeId(1), NodeId(3), NodeId(1)], bounded())?;
        let chains: Vec<Vec<NodeRecord>> = (0..4)
            .map(|id| store.read_chain(NodeId(id)))
            .collect::<Result<_>>()?;
        let headers = store.headers();
        store.close()?;
        (headers, chains)
    };

    for _ in 0..2 {
        let store = NodeStore::open(dir.path(), StoreOptions::durable())?;
        assert_eq!(store.headers(), headers);
        for (id, chain) in chains.iter().enumerate() {
            assert_eq!(&store.read_chain(NodeId(id as u64))?, chain);
        }
        store.close()?;
    }
    assert_eq!(chains[1].len(), 3);
    assert_eq!(chains[3].len(), 2);
    Ok(())
}

#[test]
fn scan_cursor_sees_ids_from_creation_time() -> Result<()> {
    let dir = tempdir()?;
    let store = NodeStore::open(dir.path(), StoreOptions::fast())?;
    store.create(3, Lifetime::from_now())?;

    let mut cursor = store.full_scan();
    assert!(matches!(cursor.read(), Err(StoreError::IllegalArgument(_))));
    // Not open yet, so the lock is free for writers.
    store.create(2, Lifetime::from_now())?;

    cursor.open();
    assert!(matches!(cursor.read(), Err(StoreError::IllegalArgument(_))));
    let mut seen = Vec::new();
    while cursor.next() {
        seen.push(cursor.read()?.id);
    }
    assert_eq!(seen, vec![NodeId(0), NodeId(1), NodeId(2)]);
    assert!(!cursor.next());
    cursor.close();
    assert!(matches!(cursor.read(), Err(StoreError::IllegalArgument(_))));

    assert_eq!(store.last_id(), Some(NodeId(4)));
    Ok(())
}

#[test]
fn version_cursor_walks_head_to_tail() -> Result<()> {
    let dir = tempdir()?;
    let store = NodeStore::open(dir.path(), StoreOptions::fast())?;
    store.create(2, Lifetime::from_now())?;
    let windows: Vec<Lifetime> = (1..=3)
        .map(|n| Lifetime::bounded(Timestamp(n), Timestamp(n * 10)).unwrap())
        .collect();
    for window in &windows {
        store.adjust_lifetime(&[NodeId(1)], *window)?;
    }

    let mut cursor = store.versions(NodeId(1));
    assert!(matches!(cursor.read(), Err(StoreError::IllegalArgument(_))));
    assert!(matches!(cursor.next(), Err(StoreError::IllegalArgument(_))));
    cursor.open()?;
    assert!(cursor.is_open());
    assert!(cursor.read()?.lifetime.is_infinite());
    let mut seen = Vec::new();
    while cursor.next()? {
        seen.push(cursor.read()?.lifetime);
    }
    assert_eq!(seen, windows);
    assert!(cursor.read()?.links.is_tail());
    cursor.close();
    assert!(matches!(cursor.read(), Err(StoreError::IllegalArgument(_))));
    assert!(matches!(cursor.next(), Err(StoreError::IllegalArgument(_))));

    // Reopening starts over at the head.
    cursor.open()?;
    assert!(cursor.read()?.links.is_head());
    drop(cursor);

    let mut unknown = store.versions(NodeId(7));
    assert!(matches!(unknown.open(), Err(StoreError::IllegalArgument(_))));
    assert!(!unknown.is_open());
    // A failed open does not keep the lock.
    store.create(1, Lifetime::from_now())?;
    Ok(())
}

const BLOCKED_FOR: Duration = Duration::from_millis(200);
const UNBLOCKED_WITHIN: Duration = Duration::from_secs(10);

#[test]
fn open_cursors_block_writers_until_closed() -> Result<()> {
    let dir = tempdir()?;
    let store = NodeStore::open(dir.path(), StoreOptions::fast())?;
    store.create(2, Lifetime::from_now())?;

    thread::scope(|scope| -> Result<()> {
        let mut scan = store.full_scan();
        scan.open();
        let (tx, rx) = mpsc::channel();
        let shared = &store;
        let writer = scope.spawn(move || {
            let created = shared.create(1, Lifetime::from_now());
            tx.send(()).ok();
            created
        });
        assert!(rx.recv_timeout(BLOCKED_FOR).is_err(), "create ran under an open scan");
        scan.close();
        assert!(rx.recv_timeout(UNBLOCKED_WITHIN).is_ok());
        assert_eq!(writer.join().expect("writer panicked")?, vec![NodeId(2)]);
        Ok(())
    })?;

    thread::scope(|scope| -> Result<()> {
        let mut versions = store.versions(NodeId(0));
        versions.open()?;
        let (tx, rx) = mpsc::channel();
        let shared = &store;
        let writer = scope.spawn(move || {
            let adjusted = shared.adjust_lifetime(&[NodeId(0)], bounded());
            tx.send(()).ok();
            adjusted
        });
        assert!(
            rx.recv_timeout(BLOCKED_FOR).is_err(),
            "adjust_lifetime ran under an open version cursor"
        );
        // The cursor still sees the chain as it was when it took the lock.
        assert!(!versions.next()?);
        versions.close();
        assert!(rx.recv_timeout(UNBLOCKED_WITHIN).is_ok());
        writer.join().expect("writer panicked")?;
        Ok(())
    })?;

    assert_eq!(store.read_chain(NodeId(0))?.len(), 2);
    Ok(())
}

#[test]
fn concurrent_creators_get_disjoint_contiguous_ids() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(NodeStore::open(dir.path(), StoreOptions::fast())?);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || -> Result<Vec<NodeId>> {
                let mut ids = Vec::new();
                for _ in 0..10 {
                    let batch = store.create(3, Lifetime::from_now())?;
                    assert!(batch.windows(2).all(|w| w[1].0 == w[0].0 + 1));
                    ids.extend(batch);
                }
                Ok(ids)
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().expect("creator thread panicked")?);
    }
    all.sort();
    assert_eq!(all, (0..120).map(NodeId).collect::<Vec<_>>());
    let (records, index) = store.headers();
    assert_eq!(records.next_id, index.cursor);
    Ok(())
}

#[test]
fn one_missing_file_is_corruption() -> Result<()> {
    let dir = tempdir()?;
    NodeStore::open(dir.path(), StoreOptions::fast())?.close()?;
    let (_, index_path) = file_paths::<NodeRecord>(dir.path());
    std::fs::remove_file(&index_path)?;

    match NodeStore::open(dir.path(), StoreOptions::fast()) {
        Err(StoreError::Corrupted { file, .. }) => assert_eq!(file, StoreFile::Index),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("store opened without its index"),
    }
    Ok(())
}

#[test]
fn growth_factor_is_validated_on_open() -> Result<()> {
    let dir = tempdir()?;
    let opts = StoreOptions::fast().with_growth_factor(1.2);
    assert!(matches!(
        NodeStore::open(dir.path(), opts),
        Err(StoreError::IllegalArgument(_))
    ));
    Ok(())
}

#[test]
fn records_carry_kind_specific_size() {
    assert_eq!(NodeRecord::SIZE, 50);
    assert_eq!(NodeRecord::KIND, "nodes");
}
