//! Storage seams consumed by the pin engine.
//!
//! The engine never talks to disk or network itself. It consumes two
//! narrow capabilities:
//!
//! - **[`DagStore`]**: fetch-by-Cid and store-returns-Cid for [`Node`]s,
//!   plus a recursive fetch used only for indirect-pin computation
//! - **[`Datastore`]**: get/put/has of one well-known key holding the
//!   durable root record pointer
//!
//! Both are object-safe async traits so the engine can sit on top of any
//! repo implementation. [`MemDagStore`] and [`MemDatastore`] back the test
//! suite and in-process embedding.

mod memory;

pub use memory::{MemDagStore, MemDatastore};

use async_trait::async_trait;

use crate::linked_data::{Cid, CodecError, Node};

#[derive(Debug, thiserror::Error)]
pub enum DagStoreError {
    #[error("node not found: {0}")]
    NotFound(Cid),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("dag store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error("datastore error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Content-addressed node storage.
///
/// `put` is idempotent: storing equal nodes yields equal Cids without
///  double-storing. Errors from an implementation propagate to the pin
///  engine's callers unchanged; retry policy lives below this seam.
#[async_trait]
pub trait DagStore: Send + Sync {
    /// Fetch a node by Cid. Fails with [`DagStoreError::NotFound`] if the
    ///  node is absent.
    async fn get(&self, cid: &Cid) -> Result<Node, DagStoreError>;

    /// Store a node, returning its Cid.
    async fn put(&self, node: &Node) -> Result<Cid, DagStoreError>;

    /// Fetch every node reachable from `cid`, the root included.
    ///  Used only for indirect-pin enumeration.
    async fn get_recursive(&self, cid: &Cid) -> Result<Vec<(Cid, Node)>, DagStoreError>;
}

/// Flat key/value storage for the root record.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DatastoreError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), DatastoreError>;

    async fn has(&self, key: &str) -> Result<bool, DatastoreError>;
}
