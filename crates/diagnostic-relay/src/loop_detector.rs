// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sliding-window repetition detector.
//!
//! Each identity key keeps the instants of its recent occurrences. Once a key
//! reaches the threshold within the window it is suppressed: the occurrence
//! that crosses the threshold is reported once as a detected loop, every
//! further one is dropped. Suppression ends as soon as the rate falls back
//! below the threshold, either on the next occurrence or on a scheduled
//! [`LoopDetector::recheck`].

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

/// Maximum number of keys tracked at once.
pub const MAX_TRACKED_KEYS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// Drop the event: the key is already suppressed.
    Suppress,
    /// Drop the event: the key just reached the threshold with `count`
    /// occurrences in the window.
    LoopDetected { count: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recheck {
    /// The rate fell below the threshold; the entry was freed.
    Cleared,
    StillLooping,
    /// The entry no longer exists (evicted, cleared or freed earlier).
    Gone,
}

#[derive(Debug, Default)]
struct Entry {
    hits: VecDeque<Instant>,
    suppressed: bool,
}

impl Entry {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.hits.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug)]
pub struct LoopDetector {
    entries: HashMap<String, Entry>,
    // insertion order, used to evict the oldest key when full
    order: VecDeque<String>,
    capacity: usize,
}

impl Default for LoopDetector {
    fn default() -> Self {
        LoopDetector::with_capacity(MAX_TRACKED_KEYS)
    }
}

impl LoopDetector {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        LoopDetector {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records one occurrence of `key` at `now` and decides its fate.
    pub fn observe(
        &mut self,
        key: &str,
        now: Instant,
        threshold: usize,
        window: Duration,
    ) -> Verdict {
        if !self.entries.contains_key(key) {
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
            self.entries.insert(key.to_string(), Entry::default());
            self.order.push_back(key.to_string());
        }
        let Some(entry) = self.entries.get_mut(key) else {
            return Verdict::Pass;
        };

        entry.prune(now, window);
        entry.hits.push_back(now);
        let cap = threshold.saturating_mul(2).max(1);
        while entry.hits.len() > cap {
            entry.hits.pop_front();
        }

        let count = entry.hits.len();
        if count >= threshold {
            if entry.suppressed {
                Verdict::Suppress
            } else {
                entry.suppressed = true;
                Verdict::LoopDetected { count }
            }
        } else {
            entry.suppressed = false;
            Verdict::Pass
        }
    }

    /// Re-prunes `key` and frees it once it fell below the threshold.
    pub fn recheck(
        &mut self,
        key: &str,
        now: Instant,
        threshold: usize,
        window: Duration,
    ) -> Recheck {
        let Some(entry) = self.entries.get_mut(key) else {
            return Recheck::Gone;
        };
        entry.prune(now, window);
        if entry.hits.len() >= threshold {
            return Recheck::StillLooping;
        }
        self.entries.remove(key);
        self.order.retain(|k| k != key);
        Recheck::Cleared
    }

    #[must_use]
    pub fn is_suppressed(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.suppressed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            self.entries.remove(&oldest);
        }
    }
}
