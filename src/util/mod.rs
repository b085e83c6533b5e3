//! Static analysis helpers over entry sets: heads, tails, and parent chains.

use crate::entry::Entry;
use cid::Cid;
use std::collections::HashSet;
use std::rc::Rc;

/// Returns `true` if `e1` is listed among `e2`'s predecessors.
pub fn is_parent(e1: &Entry, e2: &Entry) -> bool {
    e2.next().iter().any(|h| h == e1.hash())
}

/// Direct and transitive successors of `entry` within `entries`, following one
/// reference chain at a time.
pub fn find_children(entry: &Entry, entries: &[Rc<Entry>]) -> Vec<Cid> {
    let mut stack = Vec::new();
    let mut parent = entries.iter().find(|e| is_parent(entry, e));
    while let Some(p) = parent {
        stack.push(*p.hash());
        let prev = Rc::clone(p);
        parent = entries.iter().find(|e| is_parent(&prev, e));
    }
    stack
}

/// Entries not referenced by any other entry's `next`.
///
/// The returned order (clock id descending) is for display; the set itself is
/// what the head invariant is defined over.
pub fn find_heads(entries: &[Rc<Entry>]) -> Vec<Rc<Entry>> {
    let mut referenced = HashSet::new();
    for e in entries {
        for n in e.next() {
            referenced.insert(*n);
        }
    }
    let mut seen = HashSet::new();
    let mut heads: Vec<Rc<Entry>> = entries
        .iter()
        .filter(|e| !referenced.contains(e.hash()) && seen.insert(*e.hash()))
        .cloned()
        .collect();
    heads.sort_by(|a, b| b.clock().id().cmp(a.clock().id()));
    heads
}

/// Entries whose predecessors are not all present in `entries`, plus the chain
/// origins (entries with no predecessors at all). Unique by hash, in
/// last-write-wins order.
pub fn find_tails(entries: &[Rc<Entry>]) -> Vec<Rc<Entry>> {
    let hashes: HashSet<Cid> = entries.iter().map(|e| *e.hash()).collect();
    let mut seen = HashSet::new();
    let mut tails: Vec<Rc<Entry>> = entries
        .iter()
        .filter(|e| {
            (e.next().is_empty() || e.next().iter().any(|n| !hashes.contains(n)))
                && seen.insert(*e.hash())
        })
        .cloned()
        .collect();
    tails.sort();
    tails
}

/// The dangling predecessor hashes themselves: referenced by some entry in
/// `entries` but not present there. De-duplicated, oldest references first.
pub fn find_tail_hashes(entries: &[Rc<Entry>]) -> Vec<Cid> {
    let hashes: HashSet<Cid> = entries.iter().map(|e| *e.hash()).collect();
    let mut seen = HashSet::new();
    let mut ths = Vec::new();
    for e in entries {
        for n in e.next() {
            if !hashes.contains(n) && seen.insert(*n) {
                ths.push(*n);
            }
        }
    }
    ths.reverse();
    ths
}
