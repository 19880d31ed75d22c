//! The completed-frame queue (spec §3, §4.4 rule 5, §5).
//!
//! Bounded capacity 50, producer evicts the oldest entry on overflow, and
//! the consumer drains with latest-wins semantics (only the newest frame in
//! the queue is ever processed).

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use crate::frame::FrameState;

pub const DEFAULT_CAPACITY: usize = 50;

pub fn channel(capacity: usize) -> (CompletedProducer, CompletedConsumer) {
    let (tx, rx) = bounded(capacity);
    (
        CompletedProducer {
            tx,
            evict: rx.clone(),
        },
        CompletedConsumer { rx },
    )
}

/// `crossbeam_channel` is MPMC, so the producer keeps its own receiver
/// clone purely to evict the oldest entry on overflow; it never competes
/// with `CompletedConsumer` for a *completed* frame's payload.
#[derive(Debug, Clone)]
pub struct CompletedProducer {
    tx: Sender<FrameState>,
    evict: Receiver<FrameState>,
}

/// Outcome of pushing a completed frame onto the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The queue was full; the oldest queued frame was discarded to make
    /// room (counted as a drop by the caller).
    DroppedOldest,
}

impl CompletedProducer {
    pub fn push(&self, frame: FrameState) -> PushOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => PushOutcome::Accepted,
            Err(TrySendError::Full(frame)) => {
                // Evict the oldest queued entry, then retry once. A losing
                // race against a concurrent consumer just means the retry
                // succeeds immediately; either way capacity is respected.
                let _ = self.evict.try_recv();
                let _ = self.tx.try_send(frame);
                PushOutcome::DroppedOldest
            }
            Err(TrySendError::Disconnected(_)) => PushOutcome::DroppedOldest,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletedConsumer {
    rx: Receiver<FrameState>,
}

impl CompletedConsumer {
    /// Pop everything currently queued, keeping only the newest frame.
    /// Returns `(newest, discarded_count)`.
    pub fn drain_latest(&self) -> Option<(FrameState, usize)> {
        let mut newest = match self.rx.try_recv() {
            Ok(frame) => frame,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
        };
        let mut discarded = 0;
        while let Ok(frame) = self.rx.try_recv() {
            newest = frame;
            discarded += 1;
        }
        Some((newest, discarded))
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
