//! Entries: the immutable signed nodes of the log DAG.

use crate::error::Error;
use crate::identity::{Identity, IdentityProvider};
use crate::lamport_clock::LamportClock;
use crate::store::BlockStore;
use cid::Cid;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single record in the log.
///
/// An entry is created once, either by a local append or while ingesting
/// another replica's entries, and never mutated. Its [`hash`](Entry::hash) is
/// the content address of its serialized form and serves as its identity;
/// [`next`](Entry::next) points at the predecessor entries by hash.
#[derive(Debug, Clone)]
pub struct Entry {
    hash: Cid,
    id: String,
    payload: Vec<u8>,
    next: Vec<Cid>,
    clock: LamportClock,
    identity: Identity,
    sig: String,
}

/// Wire form of an entry: the byte layout handed to the block store (CBOR) and
/// embedded in snapshots (JSON). `next` holds CID strings sorted
/// lexicographically so the serialized bytes are stable across replicas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntryData {
    pub(crate) id: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) next: Vec<String>,
    pub(crate) clock: LamportClock,
    pub(crate) identity: Identity,
    pub(crate) sig: String,
}

/// The fields covered by the signature, in canonical order.
#[derive(Serialize)]
struct SigningData<'a> {
    id: &'a str,
    payload: &'a [u8],
    next: &'a [String],
    clock: &'a LamportClock,
    identity: &'a Identity,
}

impl Entry {
    /// Builds, signs, and stores a new entry.
    ///
    /// The canonical tuple `(id, payload, next, clock, identity)` is signed by
    /// `provider`, the full record is written to `store`, and the returned
    /// entry carries the resulting content hash. Without `clock` the entry is
    /// stamped at time zero under the provider's key.
    pub async fn create<S, P>(
        store: &S,
        provider: &P,
        log_id: &str,
        payload: &[u8],
        next: &[Cid],
        clock: Option<LamportClock>,
    ) -> Result<Entry, Error>
    where
        S: BlockStore,
        P: IdentityProvider,
    {
        let identity = provider.identity().clone();
        let clock = clock.unwrap_or_else(|| LamportClock::new(identity.pub_key()));
        let mut next: Vec<String> = next.iter().map(|h| h.to_string()).collect();
        next.sort();
        next.dedup();

        let signing = SigningData {
            id: log_id,
            payload,
            next: &next,
            clock: &clock,
            identity: &identity,
        };
        let sig = provider.sign(&serde_json::to_vec(&signing)?).await?;

        let data = EntryData {
            id: log_id.to_owned(),
            payload: payload.to_vec(),
            next,
            clock,
            identity,
            sig,
        };
        let hash = store.put(&serde_cbor::to_vec(&data)?).await?;
        Entry::from_data(hash, data)
    }

    /// Checks the entry's signature against the identity it carries.
    pub async fn verify<P: IdentityProvider>(provider: &P, entry: &Entry) -> Result<bool, Error> {
        let next: Vec<String> = entry.next.iter().map(|h| h.to_string()).collect();
        let signing = SigningData {
            id: &entry.id,
            payload: &entry.payload,
            next: &next,
            clock: &entry.clock,
            identity: &entry.identity,
        };
        provider
            .verify(&entry.identity, &entry.sig, &serde_json::to_vec(&signing)?)
            .await
    }

    /// Rebuilds an entry from its wire form and known content hash.
    pub(crate) fn from_data(hash: Cid, data: EntryData) -> Result<Entry, Error> {
        let next = data
            .next
            .iter()
            .map(|s| {
                Cid::try_from(s.as_str())
                    .map_err(|e| Error::InvalidArgument(format!("bad next hash \"{}\": {}", s, e)))
            })
            .collect::<Result<Vec<Cid>, Error>>()?;
        Ok(Entry {
            hash,
            id: data.id,
            payload: data.payload,
            next,
            clock: data.clock,
            identity: data.identity,
            sig: data.sig,
        })
    }

    pub(crate) fn to_data(&self) -> EntryData {
        EntryData {
            id: self.id.clone(),
            payload: self.payload.clone(),
            next: self.next.iter().map(|h| h.to_string()).collect(),
            clock: self.clock.clone(),
            identity: self.identity.clone(),
            sig: self.sig.clone(),
        }
    }

    /// Content address of this entry.
    pub fn hash(&self) -> &Cid {
        &self.hash
    }

    /// Identifier of the log this entry belongs to.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Predecessor hashes, lexicographically ordered, duplicate-free.
    pub fn next(&self) -> &[Cid] {
        &self.next
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn sig(&self) -> &str {
        &self.sig
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Entry {}

impl std::hash::Hash for Entry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.hash, state);
    }
}

/// Last-write-wins order: clock time, then clock id, then the entry hash bytes
/// as the deterministic last resort. Strict and total over any entry set.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.clock
            .cmp(&other.clock)
            .then_with(|| self.hash.to_bytes().cmp(&other.hash.to_bytes()))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
