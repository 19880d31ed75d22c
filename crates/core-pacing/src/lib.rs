//! Pacing and writer loop (spec component C6): fixed-FPS pacing against a
//! monotonic clock, latest-wins drain of the completed-frame queue, and
//! the single call site that drives the overlay writer.

use std::time::{Duration, Instant};

use core_ddp::CompletedConsumer;
use core_telemetry::Counters;
use core_writer::Writer;

/// Below this, a computed sleep is skipped entirely to avoid oversleep
/// jitter from the OS scheduler (spec §4.6).
const MIN_SLEEP: Duration = Duration::from_micros(500);

pub struct Pacer {
    max_fps: f64,
    last_write_time: Instant,
}

impl Pacer {
    pub fn new(max_fps: f64) -> Self {
        Self {
            max_fps,
            last_write_time: Instant::now(),
        }
    }

    /// Block, if `max_fps > 0`, until at least `1 / max_fps` has elapsed
    /// since the last write (spec §4.6).
    pub fn wait_for_next_slot(&self, now: Instant) {
        if self.max_fps <= 0.0 {
            return;
        }
        let min_interval = Duration::from_secs_f64(1.0 / self.max_fps);
        let elapsed = now.duration_since(self.last_write_time);
        if elapsed >= min_interval {
            return;
        }
        let remaining = min_interval - elapsed;
        if remaining > MIN_SLEEP {
            std::thread::sleep(remaining);
        }
    }

    pub fn mark_written(&mut self, at: Instant) {
        self.last_write_time = at;
    }
}

/// Drains the completed-frame queue with latest-wins semantics and drives
/// the writer. One call per loop iteration.
pub struct WriterLoop {
    consumer: CompletedConsumer,
    writer: Writer,
    pacer: Pacer,
    counters: std::sync::Arc<Counters>,
}

impl WriterLoop {
    pub fn new(
        consumer: CompletedConsumer,
        writer: Writer,
        max_fps: f64,
        counters: std::sync::Arc<Counters>,
    ) -> Self {
        Self {
            consumer,
            writer,
            pacer: Pacer::new(max_fps),
            counters,
        }
    }

    /// Run one pacing+write cycle. Returns `true` if a frame was written.
    pub fn tick(&mut self) -> bool {
        self.pacer.wait_for_next_slot(Instant::now());

        let Some((frame, dropped)) = self.consumer.drain_latest() else {
            return false;
        };
        self.counters.record_drops(dropped as u64);

        let latency_ms = self.writer.write(&frame.buffer);
        self.pacer.mark_written(Instant::now());
        self.counters.record_frame_out(latency_ms);
        true
    }

    pub fn writer(&mut self) -> &mut Writer {
        &mut self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_correction::CorrectionConfig;
    use core_ddp::{FrameState, completed_queue};
    use core_mapping::RoutingTable;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1)
    }

    fn completed_frame(bytes: &[u8]) -> FrameState {
        let mut state = FrameState::new((addr(), 0), bytes.len(), Instant::now());
        state.ingest_chunk(0, bytes, true);
        state
    }

    fn writer_loop(path: &std::path::Path) -> WriterLoop {
        let routing = RoutingTable::identity(2, 2);
        let writer = Writer::new(2, 2, path, routing, CorrectionConfig::default(), "Test_Model");
        let (_tx, rx) = completed_queue(50);
        WriterLoop::new(rx, writer, 0.0, Counters::new())
    }

    #[test]
    fn tick_returns_false_when_queue_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut wl = writer_loop(&dir.path().join("overlay.bin"));
        assert!(!wl.tick());
    }

    #[test]
    fn tick_writes_newest_frame_and_counts_drops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.bin");
        let routing = RoutingTable::identity(2, 2);
        let writer = Writer::new(2, 2, &path, routing, CorrectionConfig::default(), "Test_Model");
        let (tx, rx) = completed_queue(50);
        let counters = Counters::new();
        let mut wl = WriterLoop::new(rx, writer, 0.0, std::sync::Arc::clone(&counters));

        let frame: Vec<u8> = (0..12u8).collect();
        let stale: Vec<u8> = vec![0; 12];
        tx.push(completed_frame(&stale));
        tx.push(completed_frame(&frame));

        assert!(wl.tick());
        let snapshot = counters.take_snapshot();
        assert_eq!(snapshot.frames_out, 1);
        assert_eq!(snapshot.drops, 1);

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, frame);
    }

    #[test]
    fn pacer_skips_sleep_when_fps_disabled() {
        let pacer = Pacer::new(0.0);
        let start = Instant::now();
        pacer.wait_for_next_slot(Instant::now());
        assert!(start.elapsed() < Duration::from_millis(5));
    }
}
