use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::RwLock;

use crate::linked_data::{Cid, CodecError, Node};
use crate::lock::Lock;
use crate::store::{DagStore, DagStoreError, Datastore, DatastoreError};

use super::codec::{PinSetError, SetConfig};
use super::mode::{PinMode, PinReason, PinStatus};
use super::set::PinSet;

/// Well-known datastore key holding the durable root record pointer.
pub const PINS_ROOT_KEY: &str = "/local/pins";

const DIRECT_SET: &str = "direct";
const RECURSIVE_SET: &str = "recursive";

/// Upper bound on simultaneous subtree walks during indirect-pin
///  queries, so one query cannot fan out unboundedly against the store.
const MAX_WALK_CONCURRENCY: usize = 300;

#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("invalid pin type: {0}")]
    InvalidPinType(String),
    #[error("pin set error: {0}")]
    Set(#[from] PinSetError),
    #[error("dag store error: {0}")]
    Dag(#[from] DagStoreError),
    #[error("datastore error: {0}")]
    Datastore(#[from] DatastoreError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("invalid pin root record: {0}")]
    InvalidRoot(#[from] ipld_core::cid::Error),
}

/// Orchestrates the direct and recursive pin sets behind the public
/// query/mutation API.
///
/// All mutations are serialized by the write side of the repo lock and
/// persist a fresh root record whenever either set changed. A fresh
/// pinner operates on empty sets until [`Pinner::load`] runs; that is the
/// "no pins yet" state, not an error.
///
/// If a store error interrupts a mutation the in-memory mirrors may be
/// ahead of durable state. There is no rollback: callers must treat the
/// pinner as suspect and call [`Pinner::load`] to resynchronize from
/// durable truth before trusting further reads.
pub struct Pinner {
    lock: Lock,
    direct: PinSet,
    recursive: PinSet,
    dag: Arc<dyn DagStore>,
    repo: Arc<dyn Datastore>,
    root: RwLock<Option<Cid>>,
}

impl Pinner {
    pub fn new(dag: Arc<dyn DagStore>, repo: Arc<dyn Datastore>) -> Result<Self, PinError> {
        Self::with_config(dag, repo, SetConfig::default())
    }

    pub fn with_config(
        dag: Arc<dyn DagStore>,
        repo: Arc<dyn Datastore>,
        config: SetConfig,
    ) -> Result<Self, PinError> {
        let direct = PinSet::new(DIRECT_SET, dag.clone(), config)?;
        let recursive = PinSet::new(RECURSIVE_SET, dag.clone(), config)?;
        Ok(Self {
            lock: Lock::new("pins"),
            direct,
            recursive,
            dag,
            repo,
            root: RwLock::new(None),
        })
    }

    /// Cid of the last persisted root record, if any.
    pub fn root(&self) -> Option<Cid> {
        *self.root.read()
    }

    pub fn direct_keys(&self) -> Vec<Cid> {
        self.direct.keys()
    }

    pub fn recursive_keys(&self) -> Vec<Cid> {
        self.recursive.keys()
    }

    /// Pin keys directly: the keys themselves are retained, not what they
    ///  link to. Keys already holding the stronger recursive pin stay
    ///  where they are.
    pub async fn add_direct(&self, keys: &[Cid]) -> Result<(), PinError> {
        let _guard = self.lock.write().await;
        let keys: Vec<Cid> = keys
            .iter()
            .filter(|key| !self.recursive.has(key))
            .copied()
            .collect();
        if keys.is_empty() {
            return Ok(());
        }
        tracing::info!(count = keys.len(), "pin add (direct)");
        if self.direct.add_all(&keys).await? {
            self.flush_root().await?;
        }
        Ok(())
    }

    /// Pin keys recursively: each key and everything reachable from it is
    ///  retained. Evicts the keys from the direct set so no key is ever
    ///  counted in both.
    pub async fn add_recursive(&self, keys: &[Cid]) -> Result<(), PinError> {
        let _guard = self.lock.write().await;
        tracing::info!(count = keys.len(), "pin add (recursive)");
        let (added, evicted) = futures::try_join!(
            self.recursive.add_all(keys),
            self.direct.remove_all(keys)
        )?;
        if added || evicted {
            self.flush_root().await?;
        }
        Ok(())
    }

    /// Unpin keys. With recursive intent a key present in the recursive
    ///  set is removed from there; all other keys target the direct set.
    pub async fn remove(&self, keys: &[Cid], recursive: bool) -> Result<(), PinError> {
        let _guard = self.lock.write().await;
        let mut from_recursive = Vec::new();
        let mut from_direct = Vec::new();
        for key in keys {
            if recursive && self.recursive.has(key) {
                from_recursive.push(*key);
            } else {
                from_direct.push(*key);
            }
        }
        tracing::info!(
            recursive = from_recursive.len(),
            direct = from_direct.len(),
            "pin rm"
        );
        let (removed_r, removed_d) = futures::try_join!(
            self.recursive.remove_all(&from_recursive),
            self.direct.remove_all(&from_direct)
        )?;
        if removed_r || removed_d {
            self.flush_root().await?;
        }
        Ok(())
    }

    pub async fn is_pinned(&self, key: &Cid) -> Result<PinStatus, PinError> {
        self.is_pinned_with_type(key, PinMode::All).await
    }

    /// Classify `key` under the requested type filter.
    ///
    /// Direct and recursive checks are in-memory lookups; only the
    ///  indirect branch takes the read lock and walks the DAG under every
    ///  recursively pinned root.
    pub async fn is_pinned_with_type(
        &self,
        key: &Cid,
        mode: PinMode,
    ) -> Result<PinStatus, PinError> {
        if matches!(mode, PinMode::Recursive | PinMode::All) && self.recursive.has(key) {
            return Ok(PinStatus::pinned(PinReason::Recursive));
        }
        if mode == PinMode::Recursive {
            return Ok(PinStatus::not_pinned());
        }

        if matches!(mode, PinMode::Direct | PinMode::All) && self.direct.has(key) {
            return Ok(PinStatus::pinned(PinReason::Direct));
        }
        if mode == PinMode::Direct {
            return Ok(PinStatus::not_pinned());
        }

        // hold the read lock so the recursive set cannot shift underneath
        // a long search
        let _guard = self.lock.read().await;
        let roots = self.recursive.keys();
        let mut searches = stream::iter(roots.into_iter().map(|root| {
            let dag = self.dag.clone();
            let key = *key;
            async move {
                has_descendant(dag.as_ref(), root, &key)
                    .await
                    .map(|found| (root, found))
            }
        }))
        .buffer_unordered(MAX_WALK_CONCURRENCY);

        while let Some(result) = searches.next().await {
            let (root, found) = result?;
            if found {
                return Ok(PinStatus::pinned(PinReason::Indirect { via: root }));
            }
        }
        Ok(PinStatus::not_pinned())
    }

    /// Every key retained only because it is reachable from some
    ///  recursively pinned root. Keys that are themselves recursive pins
    ///  are reported under their own mode, never here.
    pub async fn indirect_keys(&self) -> Result<HashSet<Cid>, PinError> {
        let _guard = self.lock.read().await;
        let roots = self.recursive.keys();
        let mut keys = HashSet::new();

        let mut walks = stream::iter(roots.iter().map(|root| {
            let dag = self.dag.clone();
            let root = *root;
            async move { dag.get_recursive(&root).await }
        }))
        .buffer_unordered(MAX_WALK_CONCURRENCY);
        while let Some(reachable) = walks.next().await {
            for (cid, _) in reachable? {
                keys.insert(cid);
            }
        }
        drop(walks);

        for root in &roots {
            keys.remove(root);
        }
        Ok(keys)
    }

    /// Read the root record and replace both mirrors with durable state.
    ///  An absent record means "no pins yet" and leaves both sets empty.
    pub async fn load(&self) -> Result<(), PinError> {
        let _guard = self.lock.write().await;
        let Some(raw) = self.repo.get(PINS_ROOT_KEY).await? else {
            tracing::debug!("no pin root record, starting with empty pin sets");
            self.direct.clear();
            self.recursive.clear();
            *self.root.write() = None;
            return Ok(());
        };
        let root_cid = Cid::try_from(raw.as_slice())?;
        let root = self.dag.get(&root_cid).await?;
        futures::try_join!(self.direct.load(&root), self.recursive.load(&root))?;
        *self.root.write() = Some(root_cid);
        tracing::info!(
            root = %root_cid,
            direct = self.direct.len(),
            recursive = self.recursive.len(),
            "loaded pin state"
        );
        Ok(())
    }

    /// Every Cid that is part of the pin machinery itself: the root
    ///  record, both sets' roots and bucket nodes, and the well-known
    ///  empty node. Garbage collection must never reap these.
    pub async fn internal_blocks(&self) -> Result<HashSet<Cid>, PinError> {
        let _guard = self.lock.write().await;
        let mut blocks = HashSet::from([*self.direct.empty_cid()]);
        if let Some(root) = *self.root.read() {
            blocks.insert(root);
        }
        let (direct, recursive) = futures::try_join!(
            self.direct.internal_blocks(),
            self.recursive.internal_blocks()
        )?;
        blocks.extend(direct);
        blocks.extend(recursive);
        Ok(blocks)
    }

    async fn flush_root(&self) -> Result<Cid, PinError> {
        let (direct_link, recursive_link) =
            futures::try_join!(self.direct.save(), self.recursive.save())?;
        let record = Node::new(Vec::new(), vec![direct_link, recursive_link]);
        let cid = self.dag.put(&record).await?;
        self.repo.put(PINS_ROOT_KEY, cid.to_bytes()).await?;
        *self.root.write() = Some(cid);
        tracing::debug!(root = %cid, "persisted pin root record");
        Ok(cid)
    }
}

/// Breadth-first search for `key` among everything reachable from `root`.
async fn has_descendant(dag: &dyn DagStore, root: Cid, key: &Cid) -> Result<bool, PinError> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([root]);
    while let Some(next) = queue.pop_front() {
        if !seen.insert(next) {
            continue;
        }
        let node = dag.get(&next).await?;
        for link in node.links() {
            if link.target() == key {
                return Ok(true);
            }
            queue.push_back(*link.target());
        }
    }
    Ok(false)
}
