//! An immutable, operation-based conflict-free replicated data type ([CRDT]).
//!
//! A [`Log`] is an append-only set of signed, content-addressed entries. Each
//! entry references its predecessors by hash, so the set forms a DAG whose
//! unreferenced entries are the current heads. Replicas accept local appends,
//! exchange entries in any order, and converge: two logs holding the same
//! entry set produce the same [`values`](Log::values) sequence.
//!
//! [CRDT]: https://en.wikipedia.org/wiki/Conflict-free_replicated_data_type

use crate::entry::{Entry, EntryData};
use crate::error::Error;
use crate::identity::{Identity, IdentityProvider};
use crate::lamport_clock::LamportClock;
use crate::log_options::{LogOptions, SortMethod};
use crate::store::BlockStore;
use crate::util;
use cid::Cid;
use serde::{Deserialize, Serialize};
use std::cmp::max;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// An operation log.
#[allow(async_fn_in_trait)]
pub trait Oplog {
    /// Appends `data` to the log as a new entry.
    ///
    /// `n_ptr` widens the new entry's predecessor set beyond the current heads
    /// (`None` keeps the minimum of one pointer). Returns the appended entry.
    async fn append<T: AsRef<[u8]>>(
        &mut self,
        data: T,
        n_ptr: Option<usize>,
    ) -> Result<Rc<Entry>, Error>;

    /// Number of entries in the log.
    fn length(&self) -> usize;
}

/// Conflict-free replicated data type surface.
pub trait CRDT {
    /// The latest known entries, newest first.
    fn heads(&self) -> Vec<Rc<Entry>>;

    /// The log's Lamport clock.
    fn clock(&self) -> &LamportClock;
}

/// Authorization gate consulted before an entry enters the log, locally or
/// through a join.
#[allow(async_fn_in_trait)]
pub trait AccessController {
    /// Decides whether `entry` may be written to the log.
    async fn can_append<P: IdentityProvider>(
        &self,
        entry: &Entry,
        provider: &P,
    ) -> Result<bool, Error>;
}

/// Allow-everything access controller.
#[derive(Debug, Copy, Clone, Default)]
pub struct AdHocAccess;

impl AccessController for AdHocAccess {
    async fn can_append<P: IdentityProvider>(
        &self,
        _entry: &Entry,
        _provider: &P,
    ) -> Result<bool, Error> {
        Ok(true)
    }
}

/// The persisted form of a log: its identifier and head hashes, enough to
/// reconstruct everything else through the block store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogJson {
    pub id: String,
    pub heads: Vec<String>,
}

/// A replicated append-only log.
///
/// Generic over its collaborators: the block store `S` that persists entries
/// and yields their content hashes, the access controller `A` that gates
/// writes, and the identity provider `P` that signs and verifies.
pub struct Log<S, A, P> {
    id: String,
    store: S,
    access: A,
    provider: P,
    identity: Identity,
    entries: HashMap<Cid, Rc<Entry>>,
    heads: HashMap<Cid, Rc<Entry>>,
    nexts: HashMap<Cid, Cid>,
    clock: LamportClock,
    strategy: SortMethod,
}

impl<S, A, P> std::fmt::Debug for Log<S, A, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("id", &self.id)
            .field("length", &self.entries.len())
            .field("heads", &self.heads.keys().collect::<Vec<_>>())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<S, A, P> Oplog for Log<S, A, P>
where
    S: BlockStore,
    A: AccessController,
    P: IdentityProvider,
{
    async fn append<T: AsRef<[u8]>>(
        &mut self,
        data: T,
        n_ptr: Option<usize>,
    ) -> Result<Rc<Entry>, Error> {
        let heads = self.heads();
        let mut t_new = self.clock.time();
        for h in &heads {
            t_new = max(t_new, h.clock().time());
        }
        t_new += 1;
        let new_clock = LamportClock::new(self.identity.pub_key()).set_time(t_new);

        // The new entry points at every current head, plus enough older
        // entries to satisfy the requested pointer count.
        let refs = self.traverse(&heads, Some(max(n_ptr.unwrap_or(1), heads.len())));
        let mut next: Vec<Cid> = heads.iter().map(|h| *h.hash()).collect();
        next.extend(refs.iter().map(|e| *e.hash()));
        next.sort_by_key(|h| h.to_string());
        next.dedup();

        let entry = Entry::create(
            &self.store,
            &self.provider,
            &self.id,
            data.as_ref(),
            &next,
            Some(new_clock.clone()),
        )
        .await?;
        if !self.access.can_append(&entry, &self.provider).await? {
            return Err(Error::AppendDenied(self.identity.id().to_owned()));
        }

        // Commit: synchronous from here on.
        self.clock = new_clock;
        let rc = Rc::new(entry);
        self.entries.insert(*rc.hash(), rc.clone());
        for n in rc.next() {
            self.nexts.insert(*n, *rc.hash());
        }
        self.heads.clear();
        self.heads.insert(*rc.hash(), rc.clone());
        debug!(id = %self.id, hash = %rc.hash(), time = t_new, "appended entry");
        Ok(rc)
    }

    fn length(&self) -> usize {
        self.entries.len()
    }
}

impl<S, A, P> CRDT for Log<S, A, P>
where
    S: BlockStore,
    A: AccessController,
    P: IdentityProvider,
{
    fn heads(&self) -> Vec<Rc<Entry>> {
        let mut hs: Vec<Rc<Entry>> = self.heads.values().cloned().collect();
        self.sort_entries(&mut hs);
        hs
    }

    fn clock(&self) -> &LamportClock {
        &self.clock
    }
}

impl<S, A, P> Log<S, A, P>
where
    S: BlockStore,
    A: AccessController,
    P: IdentityProvider,
{
    /// Constructs a log owned by `provider`'s identity, using `opts` for
    /// constructor options.
    ///
    /// Without an id in `opts` a timestamp-derived identifier is generated.
    /// Preloaded entries must be internally consistent; head hashes naming
    /// unknown entries are ignored, and when no heads are given they are
    /// computed from the entries. The clock starts at the greater of the
    /// optional clock value and the latest preloaded head time.
    pub fn new(store: S, access: A, provider: P, opts: LogOptions) -> Log<S, A, P> {
        let id = opts
            .id()
            .map(str::to_owned)
            .unwrap_or_else(timestamp_id);
        let identity = provider.identity().clone();

        let mut entries: HashMap<Cid, Rc<Entry>> = HashMap::new();
        let mut nexts: HashMap<Cid, Cid> = HashMap::new();
        let mut list: Vec<Rc<Entry>> = Vec::new();
        for e in opts.entries() {
            let rc = Rc::new(e.clone());
            for n in rc.next() {
                nexts.insert(*n, *rc.hash());
            }
            if entries.insert(*rc.hash(), rc.clone()).is_none() {
                list.push(rc);
            }
        }

        let head_entries: Vec<Rc<Entry>> = if opts.heads().is_empty() {
            util::find_heads(&list)
        } else {
            let mut seen = HashSet::new();
            opts.heads()
                .iter()
                .filter(|h| seen.insert(**h))
                .filter_map(|h| entries.get(h).cloned())
                .collect()
        };
        let heads: HashMap<Cid, Rc<Entry>> = head_entries
            .into_iter()
            .map(|e| (*e.hash(), e))
            .collect();

        let mut time = opts.clock().map(|c| c.time()).unwrap_or(0);
        for h in heads.values() {
            time = max(time, h.clock().time());
        }
        let clock = LamportClock::new(identity.pub_key()).set_time(time);

        Log {
            id,
            store,
            access,
            provider,
            identity,
            entries,
            heads,
            nexts,
            clock,
            strategy: opts.strategy(),
        }
    }

    /// Returns the identifier of the log.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the identity of the owner of the log.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns `true` if the log contains an entry with the hash `hash`.
    pub fn has(&self, hash: &Cid) -> bool {
        self.entries.contains_key(hash)
    }

    /// Returns the entry with the hash `hash`, if known.
    pub fn get(&self, hash: &Cid) -> Option<&Rc<Entry>> {
        self.entries.get(hash)
    }

    /// All entries of the log, oldest first.
    ///
    /// Recomputed on every call by traversing from the heads; two logs holding
    /// the same entries return the same sequence.
    pub fn values(&self) -> Vec<Rc<Entry>> {
        let mut es = self.traverse(&self.heads(), None);
        es.reverse();
        es
    }

    /// The tail entries: those whose predecessors are not all present locally,
    /// plus the chain origins.
    pub fn tails(&self) -> Vec<Rc<Entry>> {
        util::find_tails(&self.values())
    }

    /// The dangling predecessor hashes referenced by the log but absent from it.
    pub fn tail_hashes(&self) -> Vec<Cid> {
        util::find_tail_hashes(&self.values())
    }

    /// Walks the DAG from `roots`, newest first, visiting at most `amount`
    /// entries (`None` visits every reachable entry). Predecessor hashes with
    /// no local entry are skipped; they are the log's tails.
    pub fn traverse(&self, roots: &[Rc<Entry>], amount: Option<usize>) -> Vec<Rc<Entry>> {
        let mut stack: Vec<Rc<Entry>> = Vec::new();
        let mut traversed: HashSet<Cid> = HashSet::new();
        for r in roots {
            if traversed.insert(*r.hash()) {
                stack.push(r.clone());
            }
        }
        self.sort_entries(&mut stack);

        let mut result: Vec<Rc<Entry>> = Vec::new();
        while !stack.is_empty() && amount.map_or(true, |n| result.len() < n) {
            let e = stack.remove(0);
            for n in e.next() {
                match self.entries.get(n) {
                    Some(pred) => {
                        if traversed.insert(*pred.hash()) {
                            stack.push(pred.clone());
                        }
                    }
                    None => trace!(hash = %n, "skipping tail reference"),
                }
            }
            self.sort_entries(&mut stack);
            result.push(e);
        }
        result
    }

    /// Joins the log `other` into this log. `other` is kept intact through and
    /// after the process.
    ///
    /// Every incoming entry must pass the access controller and carry a valid
    /// signature; the first failure aborts the join with this log unchanged.
    /// With `size` the log is truncated to its latest `size` entries after
    /// merging. Returns `Ok(false)` when the log identifiers differ and
    /// nothing was merged.
    pub async fn join(&mut self, other: &Log<S, A, P>, size: Option<usize>) -> Result<bool, Error> {
        if self.id != other.id {
            debug!(ours = %self.id, theirs = %other.id, "join skipped, different log ids");
            return Ok(false);
        }
        let new_items = other.diff(self);

        for e in new_items.values() {
            if !self.access.can_append(e, &self.provider).await? {
                return Err(Error::JoinDenied(e.identity().id().to_owned()));
            }
        }
        for e in new_items.values() {
            if !Entry::verify(&self.provider, e).await? {
                return Err(Error::SignatureInvalid(*e.hash()));
            }
        }

        // Commit: synchronous from here on.
        for e in new_items.values() {
            for n in e.next() {
                self.nexts.insert(*n, *e.hash());
            }
            self.entries.insert(*e.hash(), e.clone());
        }

        let mut nexts_from_new: HashSet<Cid> = HashSet::new();
        for e in new_items.values() {
            for n in e.next() {
                nexts_from_new.insert(*n);
            }
        }
        let all_heads: Vec<Rc<Entry>> = self
            .heads
            .values()
            .chain(other.heads.values())
            .cloned()
            .collect();
        let merged_heads: Vec<Rc<Entry>> = util::find_heads(&all_heads)
            .into_iter()
            .filter(|h| !nexts_from_new.contains(h.hash()))
            .filter(|h| !self.nexts.contains_key(h.hash()))
            .collect();
        self.heads = merged_heads.into_iter().map(|e| (*e.hash(), e)).collect();

        if let Some(n) = size {
            self.truncate(n);
        }

        let mut t_max = self.clock.time();
        for h in self.heads.values() {
            t_max = max(t_max, h.clock().time());
        }
        self.clock = LamportClock::new(self.identity.pub_key()).set_time(t_max);

        debug!(
            id = %self.id,
            merged = new_items.len(),
            length = self.entries.len(),
            "joined log"
        );
        Ok(true)
    }

    /// Keeps only the latest `size` entries, recomputing heads and rebuilding
    /// the successor index from the retained entries so no stale reference
    /// survives the cut.
    fn truncate(&mut self, size: usize) {
        let mut vs = self.values();
        let excess = vs.len().saturating_sub(size);
        vs.drain(..excess);
        self.entries = vs.iter().map(|e| (*e.hash(), e.clone())).collect();
        self.nexts.clear();
        for e in &vs {
            for n in e.next() {
                self.nexts.insert(*n, *e.hash());
            }
        }
        self.heads = util::find_heads(&vs)
            .into_iter()
            .map(|e| (*e.hash(), e))
            .collect();
    }

    /// Returns a map of all the entries reachable from this log's heads that
    /// are not contained in `other`. Entries belonging to a different log id
    /// are ignored.
    pub fn diff(&self, other: &Log<S, A, P>) -> HashMap<Cid, Rc<Entry>> {
        let mut stack: Vec<Cid> = self.heads().iter().map(|e| *e.hash()).collect();
        let mut traversed: HashSet<Cid> = HashSet::new();
        let mut diff: HashMap<Cid, Rc<Entry>> = HashMap::new();
        while !stack.is_empty() {
            let hash = stack.remove(0);
            if let Some(a) = self.get(&hash) {
                if other.get(&hash).is_none() && a.id() == other.id() {
                    for n in a.next() {
                        if !traversed.contains(n) && !other.has(n) {
                            stack.push(*n);
                            traversed.insert(*n);
                        }
                    }
                    traversed.insert(*a.hash());
                    diff.insert(*a.hash(), a.clone());
                }
            }
        }
        diff
    }

    /// The `{ id, heads }` form, heads newest first, as a JSON string.
    pub fn json(&self) -> String {
        let heads: Vec<String> = self.heads().iter().map(|e| e.hash().to_string()).collect();
        serde_json::json!({ "id": self.id, "heads": heads }).to_string()
    }

    /// The full snapshot form: `{ id, heads, values }` with every entry
    /// serialized, as a JSON string.
    pub fn snapshot(&self) -> Result<String, Error> {
        let heads: Vec<String> = self.heads().iter().map(|e| e.hash().to_string()).collect();
        let values = self
            .values()
            .iter()
            .map(|e| {
                let mut v = serde_json::to_value(e.to_data())?;
                v["hash"] = serde_json::Value::String(e.hash().to_string());
                Ok(v)
            })
            .collect::<Result<Vec<serde_json::Value>, Error>>()?;
        Ok(serde_json::json!({ "id": self.id, "heads": heads, "values": values }).to_string())
    }

    /// Persists the `{ id, heads }` form to the block store and returns its
    /// content hash.
    pub async fn to_multihash(&self) -> Result<Cid, Error> {
        self.store.put(self.json().as_bytes()).await
    }

    /// Reconstructs a log from the hash of its persisted `{ id, heads }` form.
    ///
    /// `length` bounds how many entries are materialized (`None` for all);
    /// `exclude` entries are skipped during fetch; `progress` is invoked once
    /// per materialized entry.
    pub async fn from_multihash(
        store: S,
        access: A,
        provider: P,
        hash: &Cid,
        length: Option<usize>,
        exclude: &[Rc<Entry>],
        progress: Option<&mut dyn FnMut(&Entry)>,
    ) -> Result<Log<S, A, P>, Error> {
        let bytes = store.get(hash).await?;
        let json: LogJson = serde_json::from_slice(&bytes)?;
        Self::from_log_json(store, access, provider, json, length, exclude, progress).await
    }

    /// Reconstructs a log from a `json()` document.
    pub async fn from_json(
        store: S,
        access: A,
        provider: P,
        json: &str,
        length: Option<usize>,
        progress: Option<&mut dyn FnMut(&Entry)>,
    ) -> Result<Log<S, A, P>, Error> {
        let parsed: LogJson = serde_json::from_str(json)?;
        Self::from_log_json(store, access, provider, parsed, length, &[], progress).await
    }

    /// Builds a log with the identifier `id` from the entries reachable from
    /// `hashes`.
    pub async fn from_entry_hash(
        store: S,
        access: A,
        provider: P,
        hashes: &[Cid],
        id: &str,
        length: Option<usize>,
        exclude: &[Rc<Entry>],
        progress: Option<&mut dyn FnMut(&Entry)>,
    ) -> Result<Log<S, A, P>, Error> {
        let entries = Self::fetch_entries(&store, hashes, length, exclude, progress).await?;
        let opts = LogOptions::new().set_id(id).set_entries(entries);
        Ok(Log::new(store, access, provider, opts))
    }

    /// Builds a log from already-materialized entries, fetching their
    /// ancestors from the store.
    pub async fn from_entry(
        store: S,
        access: A,
        provider: P,
        entries: Vec<Entry>,
        length: Option<usize>,
        exclude: &[Rc<Entry>],
        progress: Option<&mut dyn FnMut(&Entry)>,
    ) -> Result<Log<S, A, P>, Error> {
        let id = entries
            .first()
            .map(|e| e.id().to_owned())
            .ok_or_else(|| Error::InvalidArgument("no entries to build a log from".to_owned()))?;
        if entries.iter().any(|e| e.id() != id) {
            return Err(Error::InvalidArgument(
                "entries belong to different logs".to_owned(),
            ));
        }

        let mut known: Vec<Rc<Entry>> = exclude.to_vec();
        known.extend(entries.iter().cloned().map(Rc::new));
        let parents: Vec<Cid> = entries
            .iter()
            .flat_map(|e| e.next().iter().copied())
            .collect();
        let remaining = length.map(|n| n.saturating_sub(entries.len()));
        let ancestors = Self::fetch_entries(&store, &parents, remaining, &known, progress).await?;

        let mut all = entries;
        all.extend(ancestors);
        if let Some(n) = length {
            all.sort();
            let excess = all.len().saturating_sub(n);
            all.drain(..excess);
        }
        let opts = LogOptions::new().set_id(&id).set_entries(all);
        Ok(Log::new(store, access, provider, opts))
    }

    async fn from_log_json(
        store: S,
        access: A,
        provider: P,
        json: LogJson,
        length: Option<usize>,
        exclude: &[Rc<Entry>],
        progress: Option<&mut dyn FnMut(&Entry)>,
    ) -> Result<Log<S, A, P>, Error> {
        let mut heads: Vec<Cid> = Vec::new();
        for s in &json.heads {
            let cid = Cid::try_from(s.as_str())
                .map_err(|e| Error::InvalidArgument(format!("bad head hash \"{}\": {}", s, e)))?;
            heads.push(cid);
        }
        let entries = Self::fetch_entries(&store, &heads, length, exclude, progress).await?;
        let opts = LogOptions::new()
            .set_id(&json.id)
            .set_entries(entries)
            .set_heads(heads);
        Ok(Log::new(store, access, provider, opts))
    }

    /// Fetches the entries under `hashes` and their ancestors from the store,
    /// breadth-first, newest layers first. `known` entries (and anything
    /// already fetched) are skipped; `length` caps the number of entries
    /// materialized.
    async fn fetch_entries(
        store: &S,
        hashes: &[Cid],
        length: Option<usize>,
        known: &[Rc<Entry>],
        mut progress: Option<&mut dyn FnMut(&Entry)>,
    ) -> Result<Vec<Entry>, Error> {
        let mut seen: HashSet<Cid> = known.iter().map(|e| *e.hash()).collect();
        let mut queue: Vec<Cid> = Vec::new();
        for h in hashes {
            if seen.insert(*h) {
                queue.push(*h);
            }
        }
        let mut result: Vec<Entry> = Vec::new();
        while !queue.is_empty() && length.map_or(true, |n| result.len() < n) {
            let hash = queue.remove(0);
            let bytes = store.get(&hash).await?;
            let data: EntryData = serde_cbor::from_slice(&bytes)?;
            let entry = Entry::from_data(hash, data)?;
            for n in entry.next() {
                if seen.insert(*n) {
                    queue.push(*n);
                }
            }
            trace!(hash = %hash, "fetched entry");
            if let Some(ref mut cb) = progress {
                cb(&entry);
            }
            result.push(entry);
        }
        Ok(result)
    }

    /// Renders the log as an indented tree, newest entries first, with
    /// `mapper` providing the text for each entry.
    pub fn render<F>(&self, mapper: F) -> String
    where
        F: Fn(&Entry) -> String,
    {
        let values = self.values();
        let mut es = values.clone();
        es.reverse();
        let mut s = String::new();
        for e in &es {
            let parents = util::find_children(e, &values);
            if !parents.is_empty() {
                for _ in 0..parents.len().saturating_sub(1) {
                    s.push_str("  ");
                }
                s.push_str("└─");
            }
            s.push_str(&mapper(e));
            s.push('\n');
        }
        s
    }

    fn sort_entries(&self, es: &mut [Rc<Entry>]) {
        match self.strategy {
            SortMethod::LastWriteWins => es.sort_by(|a, b| b.cmp(a)),
        }
    }
}

impl<S, A, P> std::fmt::Display for Log<S, A, P>
where
    S: BlockStore,
    A: AccessController,
    P: IdentityProvider,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            self.render(|e| String::from_utf8_lossy(e.payload()).into_owned())
        )
    }
}

fn timestamp_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_owned())
}
