//! DDP frame reassembly across multiple senders and sequence numbers
//! (spec component C4, §4.4, §8 I1-I6/R1-R2/B1-B3).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::frame::{FrameKey, FrameState};
use crate::header::DdpHeader;
use crate::queue::{CompletedProducer, PushOutcome};

pub const DEFAULT_MAX_ACTIVE: usize = 12;
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(100);

/// What happened to one chunk after `Assembler::ingest` processed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Chunk accepted; its frame is still incomplete.
    Accepted,
    /// Chunk accepted and completed its frame, which moved to the queue.
    Completed,
    /// Chunk accepted, but completing it evicted the oldest queued frame.
    CompletedQueueOverflowed,
    /// Chunk's `offset + length` exceeds the configured frame size.
    OffsetOverflow,
}

/// `Assembler::ingest`'s full result: the chunk-level outcome plus whether
/// starting a *different* frame's assembly required evicting the oldest
/// active entry. The two are independent — a chunk can complete its own
/// frame on the same call that evicted someone else's — so they are kept
/// as separate fields instead of folded into one enum (spec §4.4 rule 1
/// vs. rule 5 are distinct eviction policies over distinct collections).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingested {
    pub outcome: IngestOutcome,
    pub evicted_active: bool,
}

pub struct Assembler {
    active: HashMap<FrameKey, FrameState>,
    /// Insertion/refresh order, oldest first, used for active-table LRU
    /// eviction (spec §4.4 rule 1) and timeout scanning (spec §4.4 "Expiry").
    order: Vec<FrameKey>,
    frame_size_bytes: usize,
    max_active: usize,
    frame_timeout: Duration,
    completed: CompletedProducer,
}

impl Assembler {
    pub fn new(
        frame_size_bytes: usize,
        max_active: usize,
        frame_timeout: Duration,
        completed: CompletedProducer,
    ) -> Self {
        Self {
            active: HashMap::new(),
            order: Vec::new(),
            frame_size_bytes,
            max_active,
            frame_timeout,
            completed,
        }
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Ingest one validated chunk. `evicted_active` on the result is `true`
    /// if the chunk's declared range is within bounds but the offset
    /// overflow check failed the chunk has no effect on the active table
    /// (the caller should count it as a malformed packet and drop it per
    /// spec §7).
    pub fn ingest(
        &mut self,
        sender: SocketAddr,
        header: &DdpHeader,
        payload: &[u8],
        now: Instant,
    ) -> Ingested {
        if header.offset + header.length > self.frame_size_bytes {
            return Ingested {
                outcome: IngestOutcome::OffsetOverflow,
                evicted_active: false,
            };
        }

        let key: FrameKey = (sender, header.sequence);
        let mut evicted_active = false;

        if !self.active.contains_key(&key) {
            if self.active.len() >= self.max_active {
                self.evict_oldest_active();
                evicted_active = true;
            }
            self.active
                .insert(key, FrameState::new(key, self.frame_size_bytes, now));
            self.order.push(key);
        }

        let state = self.active.get_mut(&key).expect("just inserted or present");
        state.ingest_chunk(header.offset, payload, header.push);

        if state.is_complete() {
            let completed = self.active.remove(&key).expect("present");
            self.order.retain(|k| *k != key);
            let outcome = match self.completed.push(completed) {
                PushOutcome::Accepted => IngestOutcome::Completed,
                PushOutcome::DroppedOldest => IngestOutcome::CompletedQueueOverflowed,
            };
            return Ingested { outcome, evicted_active };
        }

        Ingested {
            outcome: IngestOutcome::Accepted,
            evicted_active,
        }
    }

    fn evict_oldest_active(&mut self) {
        if self.order.is_empty() {
            return;
        }
        let oldest_key = self.order.remove(0);
        self.active.remove(&oldest_key);
    }

    /// Remove any active assembly older than the configured timeout.
    /// Returns the number of frames expired (spec §4.4 "Expiry").
    pub fn expire(&mut self, now: Instant) -> usize {
        let timeout = self.frame_timeout;
        let expired: Vec<FrameKey> = self
            .active
            .iter()
            .filter(|(_, state)| state.age(now) > timeout)
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            self.active.remove(key);
        }
        self.order.retain(|k| !expired.contains(k));
        expired.len()
    }
}
