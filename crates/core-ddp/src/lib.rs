//! DDP v1 reassembly (spec component C4): header parsing, per-frame state,
//! the active-frame table with LRU eviction and timeout expiry, and the
//! bounded completed-frame queue handed off to the pacing loop.

mod assembler;
mod frame;
mod header;
mod queue;

pub use assembler::{Assembler, DEFAULT_FRAME_TIMEOUT, DEFAULT_MAX_ACTIVE, Ingested, IngestOutcome};
pub use frame::{FrameKey, FrameState};
pub use header::{DdpError, DdpHeader, HEADER_LEN, parse as parse_header};
pub use queue::{CompletedConsumer, CompletedProducer, DEFAULT_CAPACITY, PushOutcome, channel as completed_queue};
