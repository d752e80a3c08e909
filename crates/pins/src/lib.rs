//! Anchorage pin-set storage engine.
//!
//! A pin is a promise that a content-addressed block will not be
//! garbage-collected. This crate records those promises durably in a
//! sharded, content-addressed hash trie whose serialization is canonical:
//! two nodes that pin the same set of blocks produce the same bytes, and
//! therefore the same content identifier, no matter the order the pins
//! arrived in.

/**
 * The ContentID / Link / Node model, plus the canonical
 *  DAG-CBOR block codec used to address nodes.
 */
pub mod linked_data;
/**
 * Named read/write lock scoped to one repository instance.
 */
pub mod lock;
/**
 * The pin machinery: the sharded set codec, the per-set
 *  bookkeeping, and the pinner that orchestrates both sets.
 */
pub mod pin;
/**
 * The narrow storage seams this engine consumes: a DAG store
 *  for content-addressed nodes and a key/value datastore for
 *  the single durable root record. In-memory implementations
 *  are provided for embedding and tests.
 */
pub mod store;

pub mod prelude {
    pub use crate::linked_data::{BlockEncoded, Cid, CodecError, Link, Node};
    pub use crate::lock::Lock;
    pub use crate::pin::{PinError, PinMode, PinReason, PinSet, PinSetError, PinStatus, Pinner};
    pub use crate::store::{DagStore, Datastore, MemDagStore, MemDatastore};
}
