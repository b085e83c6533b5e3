//! Options for constructing a [`Log`].
//!
//! Constructing log options using `LogOptions::new()` creates default options:
//! * no identifier (the log generates a timestamp-derived one),
//! * no preloaded entries (and no heads among those non-existent entries),
//! * no Lamport clock (the log starts at the greatest preloaded head time),
//! * last-write-wins ordering.
//!
//! Use method chaining to set additional parameters:
//!
//! ```ignore
//! let opts = LogOptions::new().set_id("some_id").set_clock(clock);
//! let log = Log::new(store, access, identity, opts);
//! ```
//!
//! [`Log`]: crate::log::Log

use crate::entry::Entry;
use crate::lamport_clock::LamportClock;
use cid::Cid;

/// Ordering strategy for entries sharing a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMethod {
    /// Clock time, then clock id, then entry hash (see [`Entry`]'s `Ord`).
    LastWriteWins,
}

/// Log construction options.
#[derive(Debug)]
pub struct LogOptions {
    id: Option<String>,
    entries: Vec<Entry>,
    heads: Vec<Cid>,
    clock: Option<LamportClock>,
    strategy: SortMethod,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            id: None,
            entries: Vec::new(),
            heads: Vec::new(),
            clock: None,
            strategy: SortMethod::LastWriteWins,
        }
    }
}

impl LogOptions {
    /// Constructs default log options.
    pub fn new() -> LogOptions {
        LogOptions::default()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn heads(&self) -> &[Cid] {
        &self.heads
    }

    pub fn clock(&self) -> Option<&LamportClock> {
        self.clock.as_ref()
    }

    pub fn strategy(&self) -> SortMethod {
        self.strategy
    }

    /// Sets the identifier for the constructed log.
    ///
    /// Allows method chaining.
    pub fn set_id(mut self, id: &str) -> LogOptions {
        self.id = Some(id.to_owned());
        self
    }

    /// Sets the entries to preload into the constructed log.
    ///
    /// Allows method chaining.
    pub fn set_entries(mut self, es: Vec<Entry>) -> LogOptions {
        self.entries = es;
        self
    }

    /// Sets the head hashes for the constructed log. When absent, heads are
    /// computed from the preloaded entries.
    ///
    /// Allows method chaining.
    pub fn set_heads(mut self, hs: Vec<Cid>) -> LogOptions {
        self.heads = hs;
        self
    }

    /// Sets the initial Lamport clock for the constructed log.
    ///
    /// Allows method chaining.
    pub fn set_clock(mut self, clock: LamportClock) -> LogOptions {
        self.clock = Some(clock);
        self
    }
}
