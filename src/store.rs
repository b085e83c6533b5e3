//! Content-addressed block store collaborator.
//!
//! The log never computes entry hashes itself: it hands canonical bytes to a
//! [`BlockStore`] and uses the returned [`Cid`] as the entry's identity.
//! [`MemoryStore`] is the in-process implementation; anything that persists
//! blocks keyed by the same CID derivation can stand in for it.

use crate::error::Error;
use cid::Cid;
use multihash::Multihash;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const SHA2_256: u64 = 0x12;
const DAG_CBOR: u64 = 0x71;

/// Derives the content address of a block: CIDv1, dag-cbor codec, SHA2-256.
pub fn block_cid(bytes: &[u8]) -> Cid {
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    let hash = Multihash::<64>::wrap(SHA2_256, &digest).expect("sha2 digest fits in a multihash");
    Cid::new_v1(DAG_CBOR, hash)
}

/// Storage capability required by the log.
///
/// Absence is a distinct condition: [`get`](BlockStore::get) fails with
/// [`Error::NotFound`] for a missing block and [`Error::Storage`] for anything
/// else, so callers can tell a tail reference from a broken store.
#[allow(async_fn_in_trait)]
pub trait BlockStore {
    /// Persists `bytes` and returns their content address.
    async fn put(&self, bytes: &[u8]) -> Result<Cid, Error>;

    /// Retrieves the block stored under `hash`.
    async fn get(&self, hash: &Cid) -> Result<Vec<u8>, Error>;
}

impl<S: BlockStore> BlockStore for Rc<S> {
    async fn put(&self, bytes: &[u8]) -> Result<Cid, Error> {
        (**self).put(bytes).await
    }

    async fn get(&self, hash: &Cid) -> Result<Vec<u8>, Error> {
        (**self).get(hash).await
    }
}

/// In-memory block store.
///
/// Interior mutability keeps `put` callable through shared handles, so several
/// logs in one replica can hold the same `Rc<MemoryStore>`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RefCell<HashMap<Cid, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Number of blocks stored.
    pub fn len(&self) -> usize {
        self.blocks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.borrow().is_empty()
    }

    pub fn has(&self, hash: &Cid) -> bool {
        self.blocks.borrow().contains_key(hash)
    }
}

impl BlockStore for MemoryStore {
    async fn put(&self, bytes: &[u8]) -> Result<Cid, Error> {
        let cid = block_cid(bytes);
        self.blocks
            .borrow_mut()
            .entry(cid)
            .or_insert_with(|| bytes.to_vec());
        Ok(cid)
    }

    async fn get(&self, hash: &Cid) -> Result<Vec<u8>, Error> {
        self.blocks
            .borrow()
            .get(hash)
            .cloned()
            .ok_or(Error::NotFound(*hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn put_get_round_trip() {
        let store = MemoryStore::new();
        let cid = block_on(store.put(b"some block")).unwrap();
        let bytes = block_on(store.get(&cid)).unwrap();
        assert_eq!(bytes, b"some block");
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        let cid = block_cid(b"never stored");
        match block_on(store.get(&cid)) {
            Err(Error::NotFound(missing)) => assert_eq!(missing, cid),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn put_is_idempotent() {
        let store = MemoryStore::new();
        let a = block_on(store.put(b"dup")).unwrap();
        let b = block_on(store.put(b"dup")).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn distinct_content_distinct_cid() {
        assert_ne!(block_cid(b"one"), block_cid(b"two"));
    }

    #[test]
    fn shared_handle_sees_writes() {
        let store = Rc::new(MemoryStore::new());
        let other = store.clone();
        let cid = block_on(store.put(b"shared")).unwrap();
        assert!(other.has(&cid));
    }
}
