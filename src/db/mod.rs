#![forbid(unsafe_code)]

//! A store directory holding the node and edge sub-stores.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::storage::{EdgeStore, NodeStore, StoreOptions};
use crate::types::{EdgeId, Lifetime, NodeId, Result, StoreError};

/// Handle to a store directory.
///
/// The two sub-stores are independent: each has its own lock and its own
/// pair of files, and a corruption in one leaves the other writable.
pub struct Database {
    dir: PathBuf,
    nodes: NodeStore,
    edges: EdgeStore,
}

impl Database {
    /// Opens the directory, creating it and every missing sub-store.
    pub fn open(dir: impl AsRef<Path>, opts: StoreOptions) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let nodes = NodeStore::open(&dir, opts.clone())?;
        let edges = EdgeStore::open(&dir, opts)?;
        info!(
            dir = %dir.display(),
            nodes = nodes.len(),
            edges = edges.len(),
            "db.open"
        );
        Ok(Self { dir, nodes, edges })
    }

    /// Directory the database lives in.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// The node sub-store.
    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    /// The edge sub-store.
    pub fn edges(&self) -> &EdgeStore {
        &self.edges
    }

    /// See [`NodeStore::create`].
    pub fn create_nodes(&self, count: u64, lifetime: Lifetime) -> Result<Vec<NodeId>> {
        self.nodes.create(count, lifetime)
    }

    /// See [`crate::storage::Store::adjust_lifetime`].
    pub fn adjust_node_lifetime(&self, ids: &[NodeId], lifetime: Lifetime) -> Result<()> {
        self.nodes.adjust_lifetime(ids, lifetime)
    }

    /// Creates edges after checking that every endpoint is an existing node.
    pub fn create_edges(
        &self,
        endpoints: &[(NodeId, NodeId)],
        lifetime: Lifetime,
    ) -> Result<Vec<EdgeId>> {
        let known = self.nodes.len();
        if endpoints
            .iter()
            .any(|(head, tail)| head.0 >= known || tail.0 >= known)
        {
            return Err(StoreError::IllegalArgument("edge endpoint is not a node"));
        }
        self.edges.create(endpoints, lifetime)
    }

    /// Gives every edge in `ids` a new version carrying `lifetime`.
    pub fn adjust_edge_lifetime(&self, ids: &[EdgeId], lifetime: Lifetime) -> Result<()> {
        self.edges.adjust_lifetime(ids, lifetime)
    }

    /// Flushes and closes both sub-stores.
    pub fn close(self) -> Result<()> {
        let nodes = self.nodes.close();
        let edges = self.edges.close();
        nodes.and(edges)
    }
}
