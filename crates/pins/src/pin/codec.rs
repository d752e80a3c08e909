//! Canonical encoding of a pin set as a sharded, content-addressed trie.
//!
//! A set small enough to fit in one node is written as a leaf: `fanout`
//! reserved bucket links (all pointing at the well-known empty node)
//! followed by one link per member, sorted by the raw bytes of the target
//! Cid. Larger sets are partitioned into up to `fanout` buckets by an
//! FNV-1a hash of the member keys and each non-empty bucket is encoded
//! recursively one level deeper. The reserved prefix gives leaves and
//! branches a structurally uniform shape, so the decoder can tell bucket
//! slots (indices below the declared fanout) from member links (indices at
//! or above it) with no other signal.
//!
//! The layout must be byte-for-byte what other implementations of the
//! protocol produce for the same member set: equal sets compare equal by
//! Cid across processes and languages.

use std::collections::{HashMap, HashSet};
use std::hash::Hasher;

use fnv::FnvHasher;
use futures::future::{BoxFuture, FutureExt};

use crate::linked_data::{BlockEncoded, Cid, CodecError, Link, Node};
use crate::store::{DagStore, DagStoreError};

/// Only header version we read or write.
pub const SET_VERSION: u32 = 1;

/// Default number of bucket slots reserved in every set node.
pub const DEFAULT_FANOUT: u32 = 256;

/// Default member count above which a set shards into buckets.
pub const DEFAULT_MAX_ITEMS: u32 = 8192;

/// Wire size of the fixed header fields (three u32s).
const HEADER_FIELDS_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum PinSetError {
    #[error("invalid pin set header")]
    InvalidHeader,
    #[error("unsupported pin set version: {0}")]
    UnsupportedVersion(u32),
    #[error("invalid pin set fanout: header declares {fanout} bucket slots but node carries {links} links")]
    InvalidFanout { fanout: u32, links: usize },
    #[error("corrupt pin set: bucket node {0} is missing")]
    Corrupt(Cid),
    #[error("pin set link not found: {0}")]
    SetLinkNotFound(String),
    #[error("dag store error: {0}")]
    Dag(#[from] DagStoreError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Sharding parameters, injectable at set construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetConfig {
    pub fanout: u32,
    pub max_items: u32,
}

impl Default for SetConfig {
    fn default() -> Self {
        Self {
            fanout: DEFAULT_FANOUT,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

/// The self-describing header stored as the first bytes of every set
///  node's data: a varint length prefix followed by version, fanout and
///  seed as little-endian u32s. The seed is the node's depth in the trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetHeader {
    pub version: u32,
    pub fanout: u32,
    pub seed: u32,
}

impl SetHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_FIELDS_LEN + 2);
        let mut buf = unsigned_varint::encode::u64_buffer();
        out.extend_from_slice(unsigned_varint::encode::u64(
            HEADER_FIELDS_LEN as u64,
            &mut buf,
        ));
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.fanout.to_le_bytes());
        out.extend_from_slice(&self.seed.to_le_bytes());
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self, PinSetError> {
        let (len, rest) =
            unsigned_varint::decode::u64(data).map_err(|_| PinSetError::InvalidHeader)?;
        if len as usize != HEADER_FIELDS_LEN || rest.len() < HEADER_FIELDS_LEN {
            return Err(PinSetError::InvalidHeader);
        }
        let version = read_u32(rest, 0);
        if version != SET_VERSION {
            return Err(PinSetError::UnsupportedVersion(version));
        }
        Ok(Self {
            version,
            fanout: read_u32(rest, 4),
            seed: read_u32(rest, 8),
        })
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

/// The well-known zero-length node whose Cid marks an unused bucket slot.
pub fn empty_node() -> Node {
    Node::default()
}

/// FNV-1a (32-bit) with the standard offset basis and prime. Fixed here
///  because the bucket partition must agree across implementations.
fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in data {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn bucket_index(depth: u32, key: &Cid, fanout: u32) -> usize {
    let mut buf = Vec::with_capacity(4 + 64);
    buf.extend_from_slice(&depth.to_le_bytes());
    buf.extend_from_slice(&key.to_bytes());
    (fnv1a_32(&buf) % fanout) as usize
}

/// Change-detection fingerprint over a bucket's member keys. Collisions
///  only risk a skipped rewrite of an unchanged-looking bucket, never a
///  wrong decode, so a fast non-cryptographic hash is enough.
fn bucket_fingerprint(members: &[Cid]) -> u64 {
    let mut hasher = FnvHasher::default();
    for key in members {
        hasher.write(&key.to_bytes());
    }
    hasher.finish()
}

/// Per-set write-avoidance cache, one slot per bucket index. Holds no
///  authoritative state: losing it costs a re-encode, never correctness.
#[derive(Debug, Default)]
pub struct BucketCache {
    slots: HashMap<u32, CacheSlot>,
}

#[derive(Debug)]
struct CacheSlot {
    fingerprint: u64,
    link: Link,
    children: BucketCache,
}

/// Encode `members` as a set node rooted at `depth`, persisting interior
///  bucket nodes through `dag`. Buckets whose fingerprint matches the
///  cache are reused without touching the store.
pub(crate) fn store_set<'a>(
    dag: &'a dyn DagStore,
    config: &'a SetConfig,
    empty: &'a Cid,
    mut members: Vec<Cid>,
    depth: u32,
    cache: &'a mut BucketCache,
) -> BoxFuture<'a, Result<Node, PinSetError>> {
    async move {
        // the total order on raw target bytes is the only reason
        // set-equal inputs yield byte-identical output
        members.sort_by(|a, b| a.to_bytes().cmp(&b.to_bytes()));

        let header = SetHeader {
            version: SET_VERSION,
            fanout: config.fanout,
            seed: depth,
        };
        let data = header.to_bytes();
        let fanout = config.fanout as usize;

        // reserved bucket slots, allocated up front and filled by index
        let mut links = vec![Link::new("", 1, *empty); fanout];

        if members.len() <= config.max_items as usize {
            links.reserve(members.len());
            for key in &members {
                links.push(Link::new("", 1, *key));
            }
            return Ok(Node::new(data, links));
        }

        let mut buckets: Vec<Vec<Cid>> = vec![Vec::new(); fanout];
        for key in members {
            buckets[bucket_index(depth, &key, config.fanout)].push(key);
        }

        for (idx, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let fingerprint = bucket_fingerprint(&bucket);
            let mut children = match cache.slots.remove(&(idx as u32)) {
                Some(slot) if slot.fingerprint == fingerprint => {
                    links[idx] = slot.link.clone();
                    cache.slots.insert(idx as u32, slot);
                    continue;
                }
                Some(slot) => slot.children,
                None => BucketCache::default(),
            };
            let child = store_set(dag, config, empty, bucket, depth + 1, &mut children).await?;
            let size = child.encode()?.len() as u64;
            let target = dag.put(&child).await?;
            let link = Link::new("", size, target);
            links[idx] = link.clone();
            cache.slots.insert(
                idx as u32,
                CacheSlot {
                    fingerprint,
                    link,
                    children,
                },
            );
        }

        Ok(Node::new(data, links))
    }
    .boxed()
}

/// Walk a set node depth-first, reporting every interior bucket node and
///  every member key to the supplied callbacks.
pub(crate) fn walk_set<'a>(
    dag: &'a dyn DagStore,
    node: Node,
    empty: Cid,
    on_bucket: &'a mut (dyn FnMut(&Cid) + Send),
    on_member: &'a mut (dyn FnMut(&Cid) + Send),
) -> BoxFuture<'a, Result<(), PinSetError>> {
    async move {
        let header = SetHeader::parse(node.data())?;
        let fanout = header.fanout as usize;
        if fanout > node.links().len() {
            return Err(PinSetError::InvalidFanout {
                fanout: header.fanout,
                links: node.links().len(),
            });
        }

        for link in &node.links()[..fanout] {
            let target = link.target();
            if target == &empty {
                continue;
            }
            on_bucket(target);
            let child = match dag.get(target).await {
                Ok(child) => child,
                // the structure promised this link exists
                Err(DagStoreError::NotFound(cid)) => return Err(PinSetError::Corrupt(cid)),
                Err(err) => return Err(err.into()),
            };
            walk_set(dag, child, empty, &mut *on_bucket, &mut *on_member).await?;
        }

        for link in &node.links()[fanout..] {
            on_member(link.target());
        }

        Ok(())
    }
    .boxed()
}

/// Decode the full membership of a set node.
pub(crate) async fn load_set(
    dag: &dyn DagStore,
    node: Node,
    empty: Cid,
) -> Result<HashSet<Cid>, PinSetError> {
    let mut members = HashSet::new();
    let mut on_bucket = |_: &Cid| {};
    let mut on_member = |cid: &Cid| {
        members.insert(*cid);
    };
    walk_set(dag, node, empty, &mut on_bucket, &mut on_member).await?;
    Ok(members)
}
