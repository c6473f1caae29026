//! Content store: a capacity-bounded cache of Data packets.

use rust_slndn_common::ndn::{Data, Interest, Name};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

struct CsRecord {
    data: Data,
    inserted: Instant,
}

impl CsRecord {
    fn is_fresh(&self, now: Instant) -> bool {
        self.inserted + Duration::from_millis(self.data.freshness_period_ms as u64) > now
    }
}

/// Exact-name cache with FIFO eviction.
pub struct ContentStore {
    records: HashMap<Name, CsRecord>,
    order: VecDeque<Name>,
    capacity: usize,
}

impl ContentStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub fn insert(&mut self, data: Data, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        if self.records.insert(data.name.clone(), CsRecord { data: data.clone(), inserted: now }).is_none() {
            self.order.push_back(data.name);
            while self.records.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.records.remove(&oldest);
                }
            }
        }
    }

    /// The cached Data satisfying `interest`, if any.
    pub fn find(&self, interest: &Interest, now: Instant) -> Option<&Data> {
        let satisfies = |record: &CsRecord| !interest.must_be_fresh || record.is_fresh(now);
        if let Some(record) = self.records.get(&interest.name) {
            if satisfies(record) {
                return Some(&record.data);
            }
        }
        if interest.can_be_prefix {
            return self
                .records
                .values()
                .filter(|r| interest.name.is_prefix_of(&r.data.name) && satisfies(r))
                .map(|r| &r.data)
                .next();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn exact_and_prefix_lookup() {
        let mut cs = ContentStore::new(8);
        let now = Instant::now();
        cs.insert(Data::new(Name::from_uri("/a/b/1"), "x"), now);

        let exact = Interest::new(Name::from_uri("/a/b/1"));
        assert!(cs.find(&exact, now).is_some());

        let mut prefix = Interest::new(Name::from_uri("/a/b"));
        assert!(cs.find(&prefix, now).is_none());
        prefix.can_be_prefix = true;
        assert!(cs.find(&prefix, now).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn must_be_fresh_rejects_stale_records() {
        let mut cs = ContentStore::new(8);
        let now = Instant::now();
        let mut data = Data::new(Name::from_uri("/a"), "x");
        data.freshness_period_ms = 50;
        cs.insert(data, now);

        let mut interest = Interest::new(Name::from_uri("/a"));
        interest.must_be_fresh = true;
        assert!(cs.find(&interest, now).is_some());

        tokio::time::advance(Duration::from_millis(60)).await;
        let later = Instant::now();
        assert!(cs.find(&interest, later).is_none());
        interest.must_be_fresh = false;
        assert!(cs.find(&interest, later).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_eviction_at_capacity() {
        let mut cs = ContentStore::new(2);
        let now = Instant::now();
        cs.insert(Data::new(Name::from_uri("/1"), "a"), now);
        cs.insert(Data::new(Name::from_uri("/2"), "b"), now);
        cs.insert(Data::new(Name::from_uri("/3"), "c"), now);

        assert_eq!(cs.len(), 2);
        assert!(cs.find(&Interest::new(Name::from_uri("/1")), now).is_none());
        assert!(cs.find(&Interest::new(Name::from_uri("/3")), now).is_some());
    }
}
