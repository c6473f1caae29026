//! Metrics collection for the forwarder.
//!
//! Plain atomic counters; scraping and export are left to the embedding
//! application.

use std::sync::atomic::{AtomicU64, Ordering};

/* ---------------------------------------------------------------- *
 * Counter
 * ---------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/* ---------------------------------------------------------------- *
 * Gauge
 * ---------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/* ---------------------------------------------------------------- *
 * Aggregate metrics
 * ---------------------------------------------------------------- */

/// Counters updated by the forwarding pipeline and the strategy.
#[derive(Debug, Default)]
pub struct ForwarderMetrics {
    pub interests_received: Counter,
    pub interests_forwarded: Counter,
    pub interests_suppressed: Counter,
    pub interests_broadcast: Counter,
    pub interests_dropped: Counter,

    pub data_received: Counter,
    pub data_sent: Counter,
    pub data_unsolicited: Counter,

    pub nacks_received: Counter,
    pub nacks_sent: Counter,

    pub cs_hits: Counter,
    pub cs_misses: Counter,

    pub pit_expirations: Counter,
    pub pit_size: Gauge,
    pub fib_size: Gauge,

    pub routes_announced: Counter,
    pub routes_renewed: Counter,
    pub faces_promoted: Counter,
}

impl ForwarderMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}
