//! Exponential retransmission suppression.
//!
//! Classifies an incoming Interest against its PIT entry: the first Interest
//! of an entry is NEW; a retransmission inside the current suppression
//! window is SUPPRESS; outside it, FORWARD, doubling the window up to the
//! maximum. State lives in the entry's strategy scratch.

use crate::pit::{PitEntry, RetxScratch};
use std::time::Duration;
use tokio::time::Instant;

pub const RETX_SUPPRESSION_INITIAL: Duration = Duration::from_millis(10);
pub const RETX_SUPPRESSION_MAX: Duration = Duration::from_millis(250);

/// The forwarder-wide default window multiplier.
pub const DEFAULT_MULTIPLIER: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetxSuppressionResult {
    /// Nothing was sent for this entry yet.
    New,
    /// A retransmission to be forwarded.
    Forward,
    /// A retransmission to be dropped silently.
    Suppress,
}

#[derive(Debug, Clone)]
pub struct RetxSuppressionExponential {
    initial: Duration,
    max: Duration,
    multiplier: f32,
}

impl RetxSuppressionExponential {
    pub fn new(initial: Duration, max: Duration, multiplier: f32) -> Self {
        Self {
            initial,
            max,
            multiplier,
        }
    }

    pub fn decide_per_pit_entry(&self, entry: &mut PitEntry, now: Instant) -> RetxSuppressionResult {
        let Some(last_outgoing) = entry.last_outgoing() else {
            entry.retx = Some(RetxScratch {
                suppression_window: self.initial,
            });
            return RetxSuppressionResult::New;
        };
        let scratch = entry.retx.get_or_insert(RetxScratch {
            suppression_window: self.initial,
        });
        let since_last = now.saturating_duration_since(last_outgoing);
        // Equal time counts as within the window.
        if since_last <= scratch.suppression_window {
            return RetxSuppressionResult::Suppress;
        }
        scratch.suppression_window = scratch.suppression_window.mul_f32(self.multiplier).min(self.max);
        RetxSuppressionResult::Forward
    }
}

impl Default for RetxSuppressionExponential {
    fn default() -> Self {
        Self::new(RETX_SUPPRESSION_INITIAL, RETX_SUPPRESSION_MAX, DEFAULT_MULTIPLIER)
    }
}
