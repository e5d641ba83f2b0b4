//! Rolling traffic counters.
//!
//! Tracks bytes and packets in both directions, with a snapshot of the last
//! full second for rate displays.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficCounters {
    pub bytes_sent: u64,
    pub bytes_recvd: u64,
    pub packets_sent: u64,
    pub packets_recvd: u64,
}

#[derive(Debug)]
pub struct NetStats {
    window_started: Instant,
    current: TrafficCounters,
    last_second: TrafficCounters,
}

impl Default for NetStats {
    fn default() -> Self {
        Self::new()
    }
}

impl NetStats {
    pub fn new() -> Self {
        NetStats {
            window_started: Instant::now(),
            current: TrafficCounters::default(),
            last_second: TrafficCounters::default(),
        }
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.roll();
        self.current.bytes_sent += bytes as u64;
        self.current.packets_sent += 1;
    }

    pub fn record_recvd(&mut self, bytes: usize) {
        self.roll();
        self.current.bytes_recvd += bytes as u64;
        self.current.packets_recvd += 1;
    }

    /// Counters accumulated in the current, still-open window.
    pub fn recent(&self) -> TrafficCounters {
        self.current
    }

    /// Counters of the last completed one-second window.
    pub fn last_second(&mut self) -> TrafficCounters {
        self.roll();
        self.last_second
    }

    fn roll(&mut self) {
        if self.window_started.elapsed() >= Duration::from_secs(1) {
            self.last_second = self.current;
            self.current = TrafficCounters::default();
            self.window_started = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let mut stats = NetStats::new();
        stats.record_sent(100);
        stats.record_sent(50);
        stats.record_recvd(30);

        let recent = stats.recent();
        assert_eq!(recent.bytes_sent, 150);
        assert_eq!(recent.packets_sent, 2);
        assert_eq!(recent.bytes_recvd, 30);
        assert_eq!(recent.packets_recvd, 1);
    }

    #[test]
    fn test_window_rolls_over() {
        let mut stats = NetStats::new();
        stats.record_sent(100);
        // Force the window into the past instead of sleeping a second.
        stats.window_started = Instant::now() - Duration::from_secs(2);

        assert_eq!(stats.last_second().bytes_sent, 100);
        assert_eq!(stats.recent().bytes_sent, 0);
    }
}
