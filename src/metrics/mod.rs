//! Live feed counters
//!
//! Every counter is kept locally for the status line and mirrored to the
//! `metrics` facade so an installed recorder can export it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub const TICKS_RECEIVED: &str = "scripwatch_feed_ticks_total";
pub const FRAMES_DROPPED: &str = "scripwatch_feed_frames_dropped_total";
pub const RECONNECT_ATTEMPTS: &str = "scripwatch_feed_reconnect_attempts_total";
pub const CONNECTIONS: &str = "scripwatch_feed_connections_total";

/// Counters shared between the feed worker and its handle
#[derive(Debug)]
pub struct FeedStats {
    ticks: AtomicU64,
    dropped_frames: AtomicU64,
    reconnect_attempts: AtomicU64,
    connections: AtomicU64,
    started: Instant,
}

impl Default for FeedStats {
    fn default() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
}

/// Point-in-time copy of [`FeedStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeedStatsSnapshot {
    pub ticks: u64,
    pub dropped_frames: u64,
    pub reconnect_attempts: u64,
    pub connections: u64,
    pub ticks_per_second: f64,
}

impl FeedStats {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!(TICKS_RECEIVED);
    }

    pub fn record_dropped_frame(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!(FRAMES_DROPPED);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!(RECONNECT_ATTEMPTS);
    }

    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!(CONNECTIONS);
    }

    pub fn snapshot(&self) -> FeedStatsSnapshot {
        let ticks = self.ticks.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed();
        let ticks_per_second = if elapsed.as_secs() == 0 {
            0.0
        } else {
            ticks as f64 / elapsed.as_secs_f64()
        };

        FeedStatsSnapshot {
            ticks,
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            ticks_per_second,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = FeedStats::default();
        stats.record_tick();
        stats.record_tick();
        stats.record_dropped_frame();
        stats.record_reconnect_attempt();
        stats.record_connection();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.ticks, 2);
        assert_eq!(snapshot.dropped_frames, 1);
        assert_eq!(snapshot.reconnect_attempts, 1);
        assert_eq!(snapshot.connections, 1);
    }

    #[test]
    fn test_rate_is_zero_before_first_second() {
        let stats = FeedStats::default();
        stats.record_tick();
        assert_eq!(stats.snapshot().ticks_per_second, 0.0);
    }
}
