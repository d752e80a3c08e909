use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::linked_data::{BlockEncoded, Cid, Link, Node};
use crate::store::{DagStore, DagStoreError};

use super::codec::{self, BucketCache, PinSetError, SetConfig};

/// One named pin collection backed by the sharded encoding.
///
/// The in-memory mirror is kept exactly in sync with the last stored root
/// node and answers membership queries without I/O. Mutations must be
/// serialized by the caller (the pinner's write lock does this); reads
/// never block on storage.
pub struct PinSet {
    name: String,
    config: SetConfig,
    empty: Cid,
    dag: Arc<dyn DagStore>,
    inner: RwLock<PinSetInner>,
}

#[derive(Default)]
struct PinSetInner {
    members: HashSet<Cid>,
    cache: BucketCache,
    last_link: Option<Link>,
    dirty: bool,
}

impl PinSet {
    pub fn new(
        name: impl Into<String>,
        dag: Arc<dyn DagStore>,
        config: SetConfig,
    ) -> Result<Self, PinSetError> {
        let empty = codec::empty_node().cid()?;
        Ok(Self {
            name: name.into(),
            config,
            empty,
            dag,
            inner: RwLock::new(PinSetInner::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn empty_cid(&self) -> &Cid {
        &self.empty
    }

    /// Membership test against the in-memory mirror. No I/O.
    pub fn has(&self, key: &Cid) -> bool {
        self.inner.read().members.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().members.is_empty()
    }

    pub fn keys(&self) -> Vec<Cid> {
        self.inner.read().members.iter().copied().collect()
    }

    pub(crate) fn clear(&self) {
        *self.inner.write() = PinSetInner::default();
    }

    /// Insert keys not already present. A call that inserts nothing is a
    ///  no-op and returns `false`; otherwise the new root is persisted
    ///  before returning `true`.
    pub async fn add_all(&self, keys: &[Cid]) -> Result<bool, PinSetError> {
        let snapshot = {
            let mut inner = self.inner.write();
            let fresh: Vec<Cid> = keys
                .iter()
                .filter(|key| !inner.members.contains(key))
                .copied()
                .collect();
            if fresh.is_empty() {
                return Ok(false);
            }
            inner.members.extend(fresh);
            inner.dirty = true;
            inner.members.iter().copied().collect::<Vec<_>>()
        };
        self.flush(snapshot).await?;
        Ok(true)
    }

    /// Remove any of `keys` that are present; absent keys are ignored.
    pub async fn remove_all(&self, keys: &[Cid]) -> Result<bool, PinSetError> {
        let snapshot = {
            let mut inner = self.inner.write();
            let mut changed = false;
            for key in keys {
                changed |= inner.members.remove(key);
            }
            if !changed {
                return Ok(false);
            }
            inner.dirty = true;
            inner.members.iter().copied().collect::<Vec<_>>()
        };
        self.flush(snapshot).await?;
        Ok(true)
    }

    /// Persist the current membership. Idempotent: when nothing changed
    ///  since the last flush the cached link is returned without touching
    ///  the store.
    pub async fn save(&self) -> Result<Link, PinSetError> {
        {
            let inner = self.inner.read();
            if !inner.dirty {
                if let Some(link) = &inner.last_link {
                    return Ok(link.clone());
                }
            }
        }
        let snapshot: Vec<Cid> = self.inner.read().members.iter().copied().collect();
        self.flush(snapshot).await
    }

    /// Replace the mirror with the set stored under our named link in
    ///  `root`.
    pub async fn load(&self, root: &Node) -> Result<(), PinSetError> {
        let link = root
            .link_named(&self.name)
            .ok_or_else(|| PinSetError::SetLinkNotFound(self.name.clone()))?;
        let node = match self.dag.get(link.target()).await {
            Ok(node) => node,
            Err(DagStoreError::NotFound(cid)) => return Err(PinSetError::Corrupt(cid)),
            Err(err) => return Err(err.into()),
        };
        let members = codec::load_set(self.dag.as_ref(), node, self.empty).await?;
        tracing::debug!(set = %self.name, members = members.len(), "loaded pin set");

        let mut inner = self.inner.write();
        inner.members = members;
        inner.cache = BucketCache::default();
        inner.last_link = Some(link.clone());
        inner.dirty = false;
        Ok(())
    }

    /// Every Cid belonging to this set's own machinery: the set root plus
    ///  all interior bucket nodes.
    pub async fn internal_blocks(&self) -> Result<HashSet<Cid>, PinSetError> {
        let link = self.save().await?;
        let mut out = HashSet::from([*link.target()]);
        let node = self.dag.get(link.target()).await?;
        let mut on_bucket = |cid: &Cid| {
            out.insert(*cid);
        };
        let mut on_member = |_: &Cid| {};
        codec::walk_set(
            self.dag.as_ref(),
            node,
            self.empty,
            &mut on_bucket,
            &mut on_member,
        )
        .await?;
        Ok(out)
    }

    async fn flush(&self, members: Vec<Cid>) -> Result<Link, PinSetError> {
        // the empty placeholder node must exist wherever the set does
        self.dag.put(&codec::empty_node()).await?;

        let mut cache = std::mem::take(&mut self.inner.write().cache);
        let node = codec::store_set(
            self.dag.as_ref(),
            &self.config,
            &self.empty,
            members,
            0,
            &mut cache,
        )
        .await?;
        let size = node.encode()?.len() as u64;
        let target = self.dag.put(&node).await?;
        let link = Link::new(self.name.clone(), size, target);
        tracing::debug!(set = %self.name, root = %target, "flushed pin set");

        let mut inner = self.inner.write();
        inner.cache = cache;
        inner.last_link = Some(link.clone());
        inner.dirty = false;
        Ok(link)
    }
}
