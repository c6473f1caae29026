//! Pending Interest Table.
//!
//! Entries are shared as `Arc<Mutex<PitEntry>>`; the strategy hands weak
//! handles to cross-executor continuations so a removed entry turns the
//! continuation into a no-op instead of a dangling reference.

use crate::face::FaceId;
use log::trace;
use rust_slndn_common::ndn::{Interest, Name, NackReason};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// Strategy metadata attached to an in-record.
#[derive(Debug, Clone, Copy, Default)]
pub struct InRecordInfo {
    /// How the downstream presented the Interest: set when it carried the
    /// `NonDiscoveryTag`.
    pub is_non_discovery_interest: bool,
}

/// Strategy metadata attached to an out-record.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutRecordInfo {
    /// Set exactly when the Interest was last sent toward this face as
    /// non-discovery, i.e. via a FIB nexthop.
    pub is_non_discovery_interest: bool,
}

/// State for one downstream face.
#[derive(Debug)]
pub struct InRecord {
    pub face: FaceId,
    pub arrival: Instant,
    pub expiry: Instant,
    info: Option<InRecordInfo>,
}

impl InRecord {
    /// The strategy metadata, lazily inserted on first access.
    pub fn info_mut(&mut self) -> &mut InRecordInfo {
        self.info.get_or_insert_with(Default::default)
    }

    pub fn info(&self) -> Option<&InRecordInfo> {
        self.info.as_ref()
    }
}

/// State for one upstream face.
#[derive(Debug)]
pub struct OutRecord {
    pub face: FaceId,
    pub last_sent: Instant,
    pub expiry: Instant,
    pub nacked: Option<NackReason>,
    info: Option<OutRecordInfo>,
}

impl OutRecord {
    pub fn info_mut(&mut self) -> &mut OutRecordInfo {
        self.info.get_or_insert_with(Default::default)
    }

    pub fn info(&self) -> Option<&OutRecordInfo> {
        self.info.as_ref()
    }
}

/// Retransmission-suppression scratch, owned by the entry.
#[derive(Debug, Clone, Copy)]
pub struct RetxScratch {
    pub suppression_window: Duration,
}

/// How many nonces an entry remembers for duplicate detection.
const NONCE_MEMORY: usize = 8;

/// Per-Interest in-flight state.
#[derive(Debug)]
pub struct PitEntry {
    pub interest: Interest,
    pub in_records: Vec<InRecord>,
    pub out_records: Vec<OutRecord>,
    pub expiry: Instant,
    pub rejected: bool,
    pub retx: Option<RetxScratch>,
    nonces: Vec<u32>,
}

impl PitEntry {
    fn new(interest: Interest, now: Instant) -> Self {
        let nonce = interest.nonce;
        Self {
            expiry: now + Duration::from_millis(interest.lifetime_ms as u64),
            interest,
            in_records: Vec::new(),
            out_records: Vec::new(),
            rejected: false,
            retx: None,
            nonces: vec![nonce],
        }
    }

    pub fn name(&self) -> &Name {
        &self.interest.name
    }

    pub fn in_record(&self, face: FaceId) -> Option<&InRecord> {
        self.in_records.iter().find(|r| r.face == face)
    }

    pub fn in_record_mut(&mut self, face: FaceId) -> Option<&mut InRecord> {
        self.in_records.iter_mut().find(|r| r.face == face)
    }

    pub fn out_record(&self, face: FaceId) -> Option<&OutRecord> {
        self.out_records.iter().find(|r| r.face == face)
    }

    pub fn out_record_mut(&mut self, face: FaceId) -> Option<&mut OutRecord> {
        self.out_records.iter_mut().find(|r| r.face == face)
    }

    /// Record the arrival of `interest` from `face`, creating or renewing
    /// the in-record and extending the entry expiry.
    pub fn insert_in_record(&mut self, face: FaceId, interest: &Interest, now: Instant) -> &mut InRecord {
        let expiry = now + Duration::from_millis(interest.lifetime_ms as u64);
        self.expiry = self.expiry.max(expiry);
        self.remember_nonce(interest.nonce);
        match self.in_records.iter().position(|r| r.face == face) {
            Some(i) => {
                let record = &mut self.in_records[i];
                record.arrival = now;
                record.expiry = expiry;
                record
            }
            None => {
                self.in_records.push(InRecord {
                    face,
                    arrival: now,
                    expiry,
                    info: None,
                });
                self.in_records.last_mut().unwrap()
            }
        }
    }

    /// Record the emission of `interest` toward `face`.
    pub fn insert_out_record(&mut self, face: FaceId, interest: &Interest, now: Instant) -> &mut OutRecord {
        let expiry = now + Duration::from_millis(interest.lifetime_ms as u64);
        match self.out_records.iter().position(|r| r.face == face) {
            Some(i) => {
                let record = &mut self.out_records[i];
                record.last_sent = now;
                record.expiry = expiry;
                record.nacked = None;
                record
            }
            None => {
                self.out_records.push(OutRecord {
                    face,
                    last_sent: now,
                    expiry,
                    nacked: None,
                    info: None,
                });
                self.out_records.last_mut().unwrap()
            }
        }
    }

    pub fn remove_in_record(&mut self, face: FaceId) {
        self.in_records.retain(|r| r.face != face);
    }

    /// The most recent send time across out-records, if anything was sent.
    pub fn last_outgoing(&self) -> Option<Instant> {
        self.out_records.iter().map(|r| r.last_sent).max()
    }

    /// Whether `nonce` was already seen on this entry.
    pub fn has_nonce(&self, nonce: u32) -> bool {
        self.nonces.contains(&nonce)
    }

    fn remember_nonce(&mut self, nonce: u32) {
        if self.nonces.contains(&nonce) {
            return;
        }
        if self.nonces.len() == NONCE_MEMORY {
            self.nonces.remove(0);
        }
        self.nonces.push(nonce);
    }
}

pub type PitHandle = Arc<Mutex<PitEntry>>;
pub type WeakPitHandle = Weak<Mutex<PitEntry>>;

/// Lock a PIT entry, recovering from poisoning (entries are only touched
/// from the main executor, so a poisoned lock holds consistent state).
pub fn lock(entry: &PitHandle) -> MutexGuard<'_, PitEntry> {
    entry.lock().unwrap_or_else(|e| e.into_inner())
}

/// The table itself, keyed by Interest name.
#[derive(Default)]
pub struct Pit {
    entries: HashMap<Name, PitHandle>,
}

impl Pit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the entry for `interest`. Returns the handle and
    /// whether it was newly created.
    pub fn insert(&mut self, interest: &Interest, now: Instant) -> (PitHandle, bool) {
        match self.entries.get(&interest.name) {
            Some(entry) => (entry.clone(), false),
            None => {
                let entry = Arc::new(Mutex::new(PitEntry::new(interest.clone(), now)));
                self.entries.insert(interest.name.clone(), entry.clone());
                (entry, true)
            }
        }
    }

    /// The entry whose Interest name is exactly `name`.
    pub fn find_exact(&self, name: &Name) -> Option<PitHandle> {
        self.entries.get(name).cloned()
    }

    /// All entries a Data packet named `name` satisfies.
    pub fn find_data_matches(&self, name: &Name) -> Vec<PitHandle> {
        self.entries
            .values()
            .filter(|entry| {
                let e = lock(entry);
                e.name() == name || (e.interest.can_be_prefix && e.name().is_prefix_of(name))
            })
            .cloned()
            .collect()
    }

    /// Remove `entry` from the table, if it is still the entry stored for
    /// its name.
    pub fn remove(&mut self, entry: &PitHandle) {
        let name = lock(entry).name().clone();
        if let Some(existing) = self.entries.get(&name) {
            if Arc::ptr_eq(existing, entry) {
                self.entries.remove(&name);
            }
        }
    }

    /// Remove `entry` when its expiry has passed. The pipeline calls this
    /// after every trigger so a satisfied or rejected entry is gone before
    /// the next packet is dispatched.
    pub fn remove_if_expired(&mut self, entry: &PitHandle, now: Instant) -> bool {
        if lock(entry).expiry <= now {
            self.remove(entry);
            return true;
        }
        false
    }

    /// Drop entries whose expiry has passed; returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|name, entry| {
            let keep = lock(entry).expiry > now;
            if !keep {
                trace!("PIT entry {name} expired");
            }
            keep
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interest(name: &str, nonce: u32) -> Interest {
        Interest::new(Name::from_uri(name)).with_nonce(nonce)
    }

    #[tokio::test(start_paused = true)]
    async fn records_are_created_and_renewed() {
        let now = Instant::now();
        let mut entry = PitEntry::new(interest("/a", 1), now);

        entry.insert_in_record(3, &interest("/a", 1), now);
        assert!(entry.in_record(3).is_some());
        assert!(entry.in_record(4).is_none());

        tokio::time::advance(Duration::from_millis(5)).await;
        let later = Instant::now();
        entry.insert_in_record(3, &interest("/a", 2), later);
        assert_eq!(entry.in_records.len(), 1);
        assert_eq!(entry.in_record(3).unwrap().arrival, later);
        assert!(entry.has_nonce(1));
        assert!(entry.has_nonce(2));

        entry.insert_out_record(7, &interest("/a", 1), later);
        assert_eq!(entry.last_outgoing(), Some(later));
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_is_lazily_inserted() {
        let now = Instant::now();
        let mut entry = PitEntry::new(interest("/a", 1), now);
        entry.insert_in_record(1, &interest("/a", 1), now);

        assert!(entry.in_record(1).unwrap().info().is_none());
        entry.in_record_mut(1).unwrap().info_mut().is_non_discovery_interest = true;
        assert!(entry.in_record(1).unwrap().info().unwrap().is_non_discovery_interest);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_expired_entries() {
        let mut pit = Pit::new();
        let now = Instant::now();
        let (entry, is_new) = pit.insert(&interest("/a", 1).with_lifetime(100), now);
        assert!(is_new);
        let (_, is_new) = pit.insert(&interest("/a", 2), now);
        assert!(!is_new);

        assert_eq!(pit.sweep(now), 0);
        lock(&entry).expiry = now;
        assert_eq!(pit.sweep(now + Duration::from_millis(1)), 1);
        assert!(pit.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn data_matching_honors_can_be_prefix() {
        let mut pit = Pit::new();
        let now = Instant::now();
        pit.insert(&interest("/a/b", 1), now);
        let mut prefix_interest = interest("/a", 2);
        prefix_interest.can_be_prefix = true;
        pit.insert(&prefix_interest, now);

        let matches = pit.find_data_matches(&Name::from_uri("/a/b"));
        assert_eq!(matches.len(), 2);
        let matches = pit.find_data_matches(&Name::from_uri("/a/c"));
        assert_eq!(matches.len(), 1);
        let matches = pit.find_data_matches(&Name::from_uri("/z"));
        assert!(matches.is_empty());
    }
}
