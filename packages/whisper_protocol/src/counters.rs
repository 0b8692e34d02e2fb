//! Bounded per-session invocation counters for one-shot actions.

use std::collections::HashMap;

pub const INITIAL_OFFER: &str = "initialOffer";
pub const INITIAL_READ: &str = "initialRead";

#[derive(Debug, Clone, Default)]
pub struct ReadCounters {
    counts: HashMap<String, u32>,
}

impl ReadCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an invocation of `action` if it has fired fewer than `max`
    /// times. Returns whether the caller should perform it.
    pub fn try_fire(&mut self, action: &str, max: u32) -> bool {
        let count = self.counts.entry(action.to_string()).or_insert(0);
        if *count < max {
            *count += 1;
            true
        } else {
            false
        }
    }

    pub fn count(&self, action: &str) -> u32 {
        self.counts.get(action).copied().unwrap_or(0)
    }
}
