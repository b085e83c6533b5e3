//! An append-only, replicated, content-addressed log.
//!
//! Each entry is an immutable signed record referencing its predecessors by
//! content hash, so a log's entries form a DAG whose unreferenced entries are
//! the current heads. Independent replicas append locally, exchange entries in
//! any order, and converge to the same totally ordered sequence: the entry set
//! grows like a G-Set, and a hybrid of Lamport time and deterministic
//! tie-breakers turns it into the same [`Log::values`] everywhere.
//!
//! The block store, access control, and signing are collaborator traits
//! ([`BlockStore`], [`AccessController`], [`IdentityProvider`]); in-process
//! implementations of each are included.

mod entry;
mod error;
mod identity;
mod lamport_clock;
mod log;
mod log_options;
mod store;
mod util;

pub use crate::entry::Entry;
pub use crate::error::Error;
pub use crate::identity::{Identity, IdentityProvider, LocalIdentity, Signatures};
pub use crate::lamport_clock::LamportClock;
pub use crate::log::{AccessController, AdHocAccess, Log, LogJson, Oplog, CRDT};
pub use crate::log_options::{LogOptions, SortMethod};
pub use crate::store::{block_cid, BlockStore, MemoryStore};
pub use crate::util::{find_children, find_heads, find_tail_hashes, find_tails, is_parent};
