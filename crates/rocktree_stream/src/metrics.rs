//! Engine statistics, refreshed once per `sync`.
//!
//! Gauges (resident set, queue depths, state counts) are overwritten each
//! frame. Counters are cumulative for the life of the engine.

use std::collections::VecDeque;

use crate::constants::LEVEL_SLOTS;
use crate::state::NodeState;

/// Rolling window for storing recent values (e.g., timing history).
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new value, evicting the oldest if at capacity.
    pub fn push(&mut self, value: T) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.buffer.back()
    }
}

impl<T: Copy + Default + std::ops::Add<Output = T>> RollingWindow<T> {
    pub fn sum(&self) -> T {
        self.buffer.iter().copied().fold(T::default(), |acc, x| acc + x)
    }
}

impl RollingWindow<u64> {
    pub fn average(&self) -> f64 {
        if self.buffer.is_empty() {
            0.0
        } else {
            self.sum() as f64 / self.buffer.len() as f64
        }
    }

    pub fn min_max(&self) -> Option<(u64, u64)> {
        let min = *self.buffer.iter().min()?;
        let max = *self.buffer.iter().max()?;
        Some((min, max))
    }
}

impl Default for RollingWindow<u64> {
    fn default() -> Self {
        Self::new(128) // ~2 seconds of frames at 60fps
    }
}

/// Streaming statistics.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    // Resident set
    /// Resident nodes per level (index = level, clamped to the last slot).
    pub resident_per_level: [u32; LEVEL_SLOTS],
    pub resident_nodes: usize,
    pub resident_bytes: usize,
    pub budget_bytes: usize,

    // Last frame
    pub frame: u64,
    pub desired_nodes: usize,
    pub drawn_nodes: usize,
    /// Drawn ancestors standing in for desired nodes that are not resident.
    pub fallback_draws: usize,
    /// Nodes per state, indexed by `NodeState::index`.
    pub state_counts: [usize; NodeState::ALL.len()],

    // Queues
    pub queued_requests: usize,
    pub in_flight_requests: usize,
    /// Node payloads waiting for their shape to be confirmed.
    pub quarantined: usize,
    /// Bytes held by quarantined payloads. They are not charged to the
    /// cache budget until admitted.
    pub quarantined_bytes: usize,

    // Counters
    pub metadata_requests: u64,
    pub data_requests: u64,
    pub deferred_requests: u64,
    pub fetches_completed: u64,
    pub fetch_failures: u64,
    pub decode_failures: u64,
    pub store_hits: u64,
    pub bytes_fetched: u64,
    pub admitted: u64,
    pub evicted: u64,
    pub uploads: u64,
    pub inconsistencies: u64,

    // Timing
    /// Rolling window of `sync` durations in microseconds.
    pub sync_timings: RollingWindow<u64>,
    pub last_sync_us: u64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self {
            resident_per_level: [0; LEVEL_SLOTS],
            resident_nodes: 0,
            resident_bytes: 0,
            budget_bytes: 0,
            frame: 0,
            desired_nodes: 0,
            drawn_nodes: 0,
            fallback_draws: 0,
            state_counts: [0; NodeState::ALL.len()],
            queued_requests: 0,
            in_flight_requests: 0,
            quarantined: 0,
            quarantined_bytes: 0,
            metadata_requests: 0,
            data_requests: 0,
            deferred_requests: 0,
            fetches_completed: 0,
            fetch_failures: 0,
            decode_failures: 0,
            store_hits: 0,
            bytes_fetched: 0,
            admitted: 0,
            evicted: 0,
            uploads: 0,
            inconsistencies: 0,
            sync_timings: RollingWindow::default(),
            last_sync_us: 0,
        }
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the per-level histogram from resident paths.
    pub fn record_resident_levels(&mut self, levels: impl IntoIterator<Item = usize>) {
        self.resident_per_level.fill(0);
        for level in levels {
            self.resident_per_level[level.min(LEVEL_SLOTS - 1)] += 1;
        }
    }

    pub fn record_sync_timing(&mut self, timing_us: u64) {
        self.sync_timings.push(timing_us);
        self.last_sync_us = timing_us;
    }

    pub fn avg_sync_timing_us(&self) -> f64 {
        self.sync_timings.average()
    }

    pub fn nodes_in(&self, state: NodeState) -> usize {
        self.state_counts[state.index()]
    }

    /// Fraction of the budget in use.
    pub fn budget_utilization(&self) -> f64 {
        if self.budget_bytes == 0 {
            0.0
        } else {
            self.resident_bytes as f64 / self.budget_bytes as f64
        }
    }

    pub fn resident_mb(&self) -> f64 {
        self.resident_bytes as f64 / 1_048_576.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_window() {
        let mut window = RollingWindow::new(3);
        assert!(window.is_empty());
        assert_eq!(window.min_max(), None);

        window.push(10u64);
        window.push(20);
        window.push(30);
        assert_eq!(window.sum(), 60);
        assert_eq!(window.average(), 20.0);

        // Oldest falls out.
        window.push(40);
        assert_eq!(window.len(), 3);
        assert_eq!(window.average(), 30.0);
        assert_eq!(window.min_max(), Some((20, 40)));
        assert_eq!(window.last(), Some(&40));
    }

    #[test]
    fn test_resident_levels_histogram() {
        let mut metrics = EngineMetrics::new();
        metrics.record_resident_levels([0, 1, 1, 4, 99]);
        assert_eq!(metrics.resident_per_level[1], 2);
        assert_eq!(metrics.resident_per_level[LEVEL_SLOTS - 1], 1);

        metrics.record_resident_levels([2]);
        assert_eq!(metrics.resident_per_level.iter().sum::<u32>(), 1);
    }

    #[test]
    fn test_sync_timing() {
        let mut metrics = EngineMetrics::new();
        metrics.record_sync_timing(100);
        metrics.record_sync_timing(300);
        assert_eq!(metrics.last_sync_us, 300);
        assert_eq!(metrics.avg_sync_timing_us(), 200.0);
    }

    #[test]
    fn test_budget_utilization() {
        let mut metrics = EngineMetrics::new();
        assert_eq!(metrics.budget_utilization(), 0.0);
        metrics.resident_bytes = 256;
        metrics.budget_bytes = 1024;
        assert_eq!(metrics.budget_utilization(), 0.25);
    }
}
