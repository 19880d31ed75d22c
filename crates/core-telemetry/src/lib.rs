//! Per-second and lifetime counters for the pixel delivery pipeline
//! (spec component C8).
//!
//! Counters are plain `AtomicU64`s with relaxed ordering: spec §4.8/§5
//! call the data diagnostic and explicitly allow relaxed ordering, so no
//! synchronization beyond atomicity is needed even when the receiver and
//! writer run on separate threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const ORDER: Ordering = Ordering::Relaxed;

#[derive(Debug, Default)]
pub struct Counters {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    packets: AtomicU64,
    drops: AtomicU64,
    incomplete: AtomicU64,
    write_latency_us_sum: AtomicU64,
}

/// A point-in-time read of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub frames_in: u64,
    pub frames_out: u64,
    pub packets: u64,
    pub drops: u64,
    pub incomplete: u64,
    pub write_latency_us_sum: u64,
}

impl Snapshot {
    pub fn write_latency_ms_avg(&self) -> f64 {
        if self.frames_out == 0 {
            0.0
        } else {
            (self.write_latency_us_sum as f64 / 1000.0) / self.frames_out as f64
        }
    }

    fn accumulate(&mut self, other: &Snapshot) {
        self.frames_in += other.frames_in;
        self.frames_out += other.frames_out;
        self.packets += other.packets;
        self.drops += other.drops;
        self.incomplete += other.incomplete;
        self.write_latency_us_sum += other.write_latency_us_sum;
    }
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_packet(&self) {
        self.packets.fetch_add(1, ORDER);
    }

    pub fn record_frame_in(&self) {
        self.frames_in.fetch_add(1, ORDER);
    }

    pub fn record_frame_out(&self, write_latency_ms: f64) {
        self.frames_out.fetch_add(1, ORDER);
        self.write_latency_us_sum
            .fetch_add((write_latency_ms * 1000.0).round() as u64, ORDER);
    }

    pub fn record_drops(&self, count: u64) {
        if count > 0 {
            self.drops.fetch_add(count, ORDER);
        }
    }

    pub fn record_incomplete(&self) {
        self.incomplete.fetch_add(1, ORDER);
    }

    pub fn record_incomplete_n(&self, count: u64) {
        if count > 0 {
            self.incomplete.fetch_add(count, ORDER);
        }
    }

    /// Read and zero every counter in one pass, returning what was read.
    pub fn take_snapshot(&self) -> Snapshot {
        Snapshot {
            frames_in: self.frames_in.swap(0, ORDER),
            frames_out: self.frames_out.swap(0, ORDER),
            packets: self.packets.swap(0, ORDER),
            drops: self.drops.swap(0, ORDER),
            incomplete: self.incomplete.swap(0, ORDER),
            write_latency_us_sum: self.write_latency_us_sum.swap(0, ORDER),
        }
    }
}

/// Emits a per-second stats line and tracks lifetime totals, mirroring the
/// cadence of the Python original's `PerformanceMonitor` (spec §4.8).
pub struct Reporter {
    counters: Arc<Counters>,
    lifetime: Snapshot,
    last_emit: Instant,
    interval: std::time::Duration,
}

impl Reporter {
    pub fn new(counters: Arc<Counters>) -> Self {
        let interval = std::time::Duration::from_secs(1);
        let now = Instant::now();
        Self {
            counters,
            lifetime: Snapshot::default(),
            last_emit: now.checked_sub(interval).unwrap_or(now),
            interval,
        }
    }

    /// Call once per loop iteration; emits and resets at each 1-second
    /// boundary. Returns the emitted snapshot, if any.
    pub fn tick(&mut self, now: Instant) -> Option<Snapshot> {
        if now.duration_since(self.last_emit) < self.interval {
            return None;
        }
        let snapshot = self.counters.take_snapshot();
        self.lifetime.accumulate(&snapshot);
        self.last_emit = now;

        tracing::info!(
            target: "telemetry",
            frames_in = snapshot.frames_in,
            frames_out = snapshot.frames_out,
            packets = snapshot.packets,
            drops = snapshot.drops,
            incomplete = snapshot.incomplete,
            write_latency_ms_avg = snapshot.write_latency_ms_avg(),
            "stats"
        );
        Some(snapshot)
    }

    /// Fold any not-yet-emitted counters into the lifetime total and log
    /// the shutdown summary.
    pub fn summary(mut self) -> Snapshot {
        let tail = self.counters.take_snapshot();
        self.lifetime.accumulate(&tail);
        tracing::info!(
            target: "telemetry",
            frames_in = self.lifetime.frames_in,
            frames_out = self.lifetime.frames_out,
            packets = self.lifetime.packets,
            drops = self.lifetime.drops,
            incomplete = self.lifetime.incomplete,
            write_latency_ms_avg = self.lifetime.write_latency_ms_avg(),
            "lifetime_summary"
        );
        self.lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_resets_after_take() {
        let counters = Counters::new();
        counters.record_packet();
        counters.record_frame_in();
        let first = counters.take_snapshot();
        assert_eq!(first.packets, 1);
        assert_eq!(first.frames_in, 1);
        let second = counters.take_snapshot();
        assert_eq!(second.packets, 0);
    }

    #[test]
    fn write_latency_average_divides_by_frames_out() {
        let counters = Counters::new();
        counters.record_frame_out(2.0);
        counters.record_frame_out(4.0);
        let snapshot = counters.take_snapshot();
        assert_eq!(snapshot.frames_out, 2);
        assert!((snapshot.write_latency_ms_avg() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn reporter_does_not_emit_before_interval() {
        let counters = Counters::new();
        let mut reporter = Reporter::new(counters);
        let now = Instant::now();
        assert!(reporter.tick(now).is_some());
        assert!(reporter.tick(now).is_none());
    }
}
