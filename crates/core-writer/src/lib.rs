//! The FPP overlay writer (spec component C2): owns the mmap buffer,
//! scatters gamma-corrected pixels into it, and flushes to shared memory.

mod overlay;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Instant;

use core_correction::CorrectionConfig;
use core_mapping::RoutingTable;
use memmap2::MmapMut;

/// Owns the memory-mapped overlay buffer exclusively; spec §9 calls this
/// out explicitly ("make C2 uniquely owned by the supervisor").
pub struct Writer {
    mmap: Option<MmapMut>,
    routing: RoutingTable,
    correction: CorrectionConfig,
    total_leds: usize,
    path: PathBuf,
    degraded: bool,
    /// Scratch buffer reused across writes to avoid a per-frame allocation.
    scratch: Vec<u8>,
}

impl Writer {
    /// Create or resize the backing mmap file to `width * height * 3`
    /// bytes, zero-fill it, and map it read-write. On permission failure
    /// the writer enters degraded no-op mode rather than panicking (spec
    /// §4.2, §7 "Init/permission" row).
    pub fn new(
        width: usize,
        height: usize,
        path: &Path,
        routing: RoutingTable,
        correction: CorrectionConfig,
        model: &str,
    ) -> Self {
        let total_leds = width * height;
        let buffer_size = total_leds * 3;

        let mmap = match open_and_map(path, buffer_size) {
            Ok(mmap) => Some(mmap),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "writer_mmap_unavailable_degraded_mode");
                None
            }
        };

        if mmap.is_some() {
            overlay::activate(model);
        }

        Self {
            degraded: mmap.is_none(),
            mmap,
            scratch: vec![0u8; routing.len() * 3],
            routing,
            correction,
            total_leds,
            path: path.to_path_buf(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn buffer_size(&self) -> usize {
        self.total_leds * 3
    }

    /// Gather routed pixels, correct them, scatter into the mmap, and
    /// flush. Returns the write latency in milliseconds (0.0 in degraded
    /// mode, spec §4.2).
    pub fn write(&mut self, frame: &[u8]) -> f64 {
        let Some(mmap) = self.mmap.as_mut() else {
            return 0.0;
        };
        let start = Instant::now();

        for (slot, &src) in self.routing.src_indices.iter().enumerate() {
            let s = src as usize * 3;
            self.scratch[slot * 3..slot * 3 + 3].copy_from_slice(&frame[s..s + 3]);
        }
        let _ = self.correction.apply(&mut self.scratch);

        for (slot, &dst) in self.routing.dst_indices.iter().enumerate() {
            let d = dst as usize * 3;
            mmap[d..d + 3].copy_from_slice(&self.scratch[slot * 3..slot * 3 + 3]);
        }
        let _ = mmap.flush();

        start.elapsed().as_secs_f64() * 1000.0
    }

    /// Fill the entire buffer with one corrected solid color (spec §4.2).
    pub fn write_solid(&mut self, r: u8, g: u8, b: u8) -> f64 {
        let Some(mmap) = self.mmap.as_mut() else {
            return 0.0;
        };
        let start = Instant::now();

        let mut triplet = [r, g, b];
        let _ = self.correction.apply(&mut triplet);
        for chunk in mmap.chunks_exact_mut(3) {
            chunk.copy_from_slice(&triplet);
        }
        let _ = mmap.flush();

        start.elapsed().as_secs_f64() * 1000.0
    }

    /// Unmap and drop the file handle. Safe to call more than once.
    pub fn close(&mut self) {
        self.mmap = None;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_and_map(path: &Path, buffer_size: usize) -> std::io::Result<MmapMut> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    // Always truncate then re-extend: a freshly extended region reads back
    // as zero on every mainstream filesystem, giving the unconditional
    // zero-fill spec §4.2 asks for regardless of prior file contents.
    file.set_len(0)?;
    file.set_len(buffer_size as u64)?;

    unsafe { MmapMut::map_mut(&file) }
}
