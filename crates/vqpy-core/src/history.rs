//! Bounded per-object history of property values.
//!
//! A `HISTORY(n)` property keeps its last `n` observations for every tracked
//! object. Observations are indexed from the newest: `[-1]` is the current
//! frame's value, `[-2]` the previous observation, and so on.

use crate::query::Value;
use std::collections::{HashMap, VecDeque};
use tracing::trace;

/// Identifies one history series: (property id, track id)
pub type HistoryKey = (usize, u64);

#[derive(Debug, Clone)]
struct Series {
    capacity: usize,
    last_seen: u64,
    /// (frame index, value), oldest first
    entries: VecDeque<(u64, Value)>,
}

/// Store of bounded histories
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    series: HashMap<HistoryKey, Series>,
}

impl HistoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation for `frame`.
    ///
    /// Re-recording the same frame replaces its value. Once `capacity`
    /// observations are held the oldest is dropped.
    pub fn record(&mut self, key: HistoryKey, capacity: usize, frame: u64, value: Value) {
        let capacity = capacity.max(1);
        let series = self.series.entry(key).or_insert_with(|| Series {
            capacity,
            last_seen: frame,
            entries: VecDeque::with_capacity(capacity),
        });
        series.capacity = capacity;
        series.last_seen = frame;

        if let Some(last) = series.entries.back_mut() {
            if last.0 == frame {
                last.1 = value;
                return;
            }
        }

        series.entries.push_back((frame, value));
        while series.entries.len() > series.capacity {
            series.entries.pop_front();
        }
    }

    /// Observation `k` steps back (`k = 1` is the current frame).
    ///
    /// If `frame` has not been recorded yet, `k = 1` is NULL and `k >= 2`
    /// counts back from the newest stored observation.
    pub fn lookup(&self, key: HistoryKey, k: usize, frame: u64) -> Value {
        let Some(series) = self.series.get(&key) else {
            return Value::Null;
        };
        if k == 0 {
            return Value::Null;
        }

        let has_current = series.entries.back().is_some_and(|(f, _)| *f == frame);
        let back = if has_current {
            k - 1
        } else if k == 1 {
            return Value::Null;
        } else {
            k - 2
        };

        series
            .entries
            .iter()
            .rev()
            .nth(back)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null)
    }

    /// All observations of a series, oldest first
    pub fn observations(&self, key: HistoryKey) -> Vec<Value> {
        self.series
            .get(&key)
            .map(|s| s.entries.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default()
    }

    /// Drop series whose track has not been observed for more than `max_idle` frames.
    /// Returns the number of series removed.
    pub fn evict_idle(&mut self, frame: u64, max_idle: u64) -> usize {
        let before = self.series.len();
        self.series
            .retain(|_, s| frame.saturating_sub(s.last_seen) <= max_idle);
        let removed = before - self.series.len();
        if removed > 0 {
            trace!(frame, removed, "Evicted idle history series");
        }
        removed
    }

    /// Number of distinct tracks with at least one series
    pub fn track_count(&self) -> usize {
        let mut tracks: Vec<u64> = self.series.keys().map(|(_, t)| *t).collect();
        tracks.sort_unstable();
        tracks.dedup();
        tracks.len()
    }

    /// Number of series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// True when no series is held
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Drop every series
    pub fn clear(&mut self) {
        self.series.clear();
    }
}
