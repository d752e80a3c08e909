use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::linked_data::{BlockEncoded, Cid, Node};

use super::{DagStore, DagStoreError, Datastore, DatastoreError};

/// In-memory [`DagStore`].
///
/// Keeps a running count of `put` calls so tests can assert how many
///  nodes a re-encode actually touched.
#[derive(Debug, Clone, Default)]
pub struct MemDagStore {
    nodes: Arc<RwLock<HashMap<Cid, Node>>>,
    puts: Arc<AtomicU64>,
}

impl MemDagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls issued against this store so far.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Number of distinct nodes held.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[async_trait]
impl DagStore for MemDagStore {
    async fn get(&self, cid: &Cid) -> Result<Node, DagStoreError> {
        self.nodes
            .read()
            .get(cid)
            .cloned()
            .ok_or(DagStoreError::NotFound(*cid))
    }

    async fn put(&self, node: &Node) -> Result<Cid, DagStoreError> {
        let cid = node.cid()?;
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.nodes.write().insert(cid, node.clone());
        Ok(cid)
    }

    async fn get_recursive(&self, cid: &Cid) -> Result<Vec<(Cid, Node)>, DagStoreError> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*cid]);

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            let node = self.get(&next).await?;
            for link in node.links() {
                queue.push_back(*link.target());
            }
            out.push((next, node));
        }

        Ok(out)
    }
}

/// In-memory [`Datastore`].
#[derive(Debug, Clone, Default)]
pub struct MemDatastore {
    records: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Datastore for MemDatastore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DatastoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), DatastoreError> {
        self.records.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, DatastoreError> {
        Ok(self.records.read().contains_key(key))
    }
}
