//! Forwarding Information Base.
//!
//! Longest-prefix match over Name prefixes; each entry keeps its nexthops
//! sorted ascending by cost, so strategies can treat the list as ranked.

use crate::face::FaceId;
use rust_slndn_common::ndn::Name;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextHop {
    pub face: FaceId,
    pub cost: u64,
}

#[derive(Debug)]
pub struct FibEntry {
    prefix: Name,
    nexthops: Vec<NextHop>,
}

impl FibEntry {
    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    /// Nexthops ranked ascending by cost.
    pub fn nexthops(&self) -> &[NextHop] {
        &self.nexthops
    }

    fn upsert(&mut self, face: FaceId, cost: u64) {
        match self.nexthops.iter_mut().find(|h| h.face == face) {
            Some(hop) => hop.cost = cost,
            None => self.nexthops.push(NextHop { face, cost }),
        }
        self.nexthops.sort_by_key(|h| h.cost);
    }
}

#[derive(Default)]
pub struct Fib {
    entries: BTreeMap<Name, FibEntry>,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Longest-prefix match. Entries without nexthops never match.
    pub fn lookup(&self, name: &Name) -> Option<&FibEntry> {
        for len in (0..=name.len()).rev() {
            if let Some(entry) = self.entries.get(&name.prefix(len)) {
                if !entry.nexthops.is_empty() {
                    return Some(entry);
                }
            }
        }
        None
    }

    /// Add or update a nexthop under `prefix`.
    pub fn insert(&mut self, prefix: Name, face: FaceId, cost: u64) {
        self.entries
            .entry(prefix.clone())
            .or_insert_with(|| FibEntry {
                prefix,
                nexthops: Vec::new(),
            })
            .upsert(face, cost);
    }

    /// Remove the nexthop via `face` under `prefix`; an entry left without
    /// nexthops is dropped.
    pub fn remove_nexthop(&mut self, prefix: &Name, face: FaceId) {
        if let Some(entry) = self.entries.get_mut(prefix) {
            entry.nexthops.retain(|h| h.face != face);
            if entry.nexthops.is_empty() {
                self.entries.remove(prefix);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FibEntry> {
        self.entries.values()
    }
}
