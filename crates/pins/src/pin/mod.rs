//! Pin bookkeeping for content-addressed blocks.
//!
//! This module is the engine that records which blocks must survive
//! garbage collection:
//!
//! - **codec**: the canonical sharded trie encoding ([`SetHeader`],
//!   [`BucketCache`], [`SetConfig`])
//! - **[`PinSet`]**: one named collection ("direct" or "recursive") with
//!   an in-memory membership mirror
//! - **[`Pinner`]**: the public query/mutation API over both sets, the
//!   durable root record, and derived indirect classification
//!
//! # Layout
//!
//! ```text
//! datastore["/local/pins"] --> root record (2-link node)
//!                                 |-- "direct"    --> set node
//!                                 |-- "recursive" --> set node
//!                                                       |
//!                                      fanout bucket slots ... members
//!                                          |
//!                                     child set nodes (depth + 1)
//! ```
//!
//! A set node's first `fanout` links are reserved bucket slots; unused
//! slots point at the well-known empty node. Member links follow, sorted
//! by raw target bytes, so equal sets always serialize to equal bytes.

mod codec;
mod mode;
mod pinner;
mod set;

pub use codec::{
    BucketCache, PinSetError, SetConfig, SetHeader, DEFAULT_FANOUT, DEFAULT_MAX_ITEMS, SET_VERSION,
};
pub use mode::{PinMode, PinReason, PinStatus};
pub use pinner::{PinError, Pinner, PINS_ROOT_KEY};
pub use set::PinSet;
