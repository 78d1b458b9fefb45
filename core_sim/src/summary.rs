use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::Outcome;

/// hit/miss/eviction counters accumulated over a trace.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Summary {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl Summary {
    pub fn record(&mut self, outcome: Outcome) {
        if outcome.contains(Outcome::Hit) {
            self.hits += 1;
        }
        if outcome.contains(Outcome::Miss) {
            self.misses += 1;
        }
        if outcome.contains(Outcome::Eviction) {
            self.evictions += 1;
        }
    }
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }
    pub fn hit_rate(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits:{} misses:{} evictions:{}",
            self.hits, self.misses, self.evictions
        )
    }
}
