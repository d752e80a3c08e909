//! The linked data model for the pin engine.
//!
//! Everything durable in this crate is a [`Node`]: an immutable record of
//! raw bytes plus an ordered list of named, sized, targeted [`Link`]s.
//! Nodes are content-addressed: a node's [`Cid`] is a pure function of its
//! canonical DAG-CBOR serialization, so "updating" a stored node always
//! means producing a new node under a new Cid.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};

pub use ipld_core::cid::Cid;

/// Multicodec code for DAG-CBOR.
pub const DAG_CBOR_CODEC: u64 = 0x71;

/// Multihash code for sha2-256.
const SHA2_256_CODE: u64 = 0x12;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(#[from] serde_ipld_dagcbor::error::EncodeError<std::collections::TryReserveError>),
    #[error("decode error: {0}")]
    Decode(#[from] serde_ipld_dagcbor::error::DecodeError<std::convert::Infallible>),
    #[error("multihash error: {0}")]
    Multihash(#[from] multihash::Error),
}

/// Compute the Cid for a canonical block serialization.
pub fn cid_for_block(bytes: &[u8]) -> Result<Cid, CodecError> {
    let digest = Sha256::digest(bytes);
    let hash = multihash::Multihash::<64>::wrap(SHA2_256_CODE, digest.as_slice())?;
    Ok(Cid::new_v1(DAG_CBOR_CODEC, hash))
}

/// Anything that has a canonical DAG-CBOR block encoding, and therefore
///  a content identifier.
pub trait BlockEncoded: Serialize + DeserializeOwned + Sized {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_ipld_dagcbor::to_vec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_ipld_dagcbor::from_slice(bytes)?)
    }

    fn cid(&self) -> Result<Cid, CodecError> {
        cid_for_block(&self.encode()?)
    }
}

/// A node's outgoing edge: a name, the size of the thing on the other
///  end, and the Cid it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    name: String,
    size: u64,
    target: Cid,
}

impl Link {
    pub fn new(name: impl Into<String>, size: u64, target: Cid) -> Self {
        Self {
            name: name.into(),
            size,
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn target(&self) -> &Cid {
        &self.target
    }
}

/// An immutable, content-addressed record of raw bytes plus links.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Node {
    #[serde_as(as = "Bytes")]
    data: Vec<u8>,
    links: Vec<Link>,
}

impl BlockEncoded for Node {}

impl Node {
    pub fn new(data: Vec<u8>, links: Vec<Link>) -> Self {
        Self { data, links }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Find the first link with the given name.
    pub fn link_named(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name() == name)
    }
}
