//! Rendered clip player (spec component C7): loads a precomputed frame
//! array from a zip-archived clip container and paces its playback through
//! the overlay writer.

mod npy;

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use core_writer::Writer;
use npy::NpyArray;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("failed to open clip archive {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read clip archive {path}: {source}")]
    Archive {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("clip archive missing required entry {0}")]
    MissingEntry(&'static str),
    #[error("malformed {entry}: {source}")]
    Malformed {
        entry: &'static str,
        #[source]
        source: npy::NpyError,
    },
    #[error("frames array has {actual} bytes, expected a multiple of {frame_bytes}")]
    SizeMismatch { actual: usize, frame_bytes: usize },
}

/// An immutable, fully decoded clip: a flat buffer of `num_frames *
/// frame_bytes` bytes plus the playback metadata recorded alongside it.
pub struct Clip {
    frames: Vec<u8>,
    frame_bytes: usize,
    num_frames: usize,
    pub fps: f32,
    pub width: usize,
    pub height: usize,
}

impl Clip {
    /// Load `frames.npy`, `fps.npy`, `width.npy`, and `height.npy` out of a
    /// zip archive at `path`.
    pub fn load(path: &Path) -> Result<Self, ClipError> {
        let file = File::open(path).map_err(|source| ClipError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|source| ClipError::Archive {
            path: path.display().to_string(),
            source,
        })?;

        let frames_bytes = read_entry(&mut archive, "frames.npy")?;
        let fps_bytes = read_entry(&mut archive, "fps.npy")?;
        let width_bytes = read_entry(&mut archive, "width.npy")?;
        let height_bytes = read_entry(&mut archive, "height.npy")?;

        let frames_arr = NpyArray::parse(&frames_bytes).map_err(|source| ClipError::Malformed {
            entry: "frames.npy",
            source,
        })?;
        let fps_arr = NpyArray::parse(&fps_bytes).map_err(|source| ClipError::Malformed {
            entry: "fps.npy",
            source,
        })?;
        let width_arr = NpyArray::parse(&width_bytes).map_err(|source| ClipError::Malformed {
            entry: "width.npy",
            source,
        })?;
        let height_arr = NpyArray::parse(&height_bytes).map_err(|source| ClipError::Malformed {
            entry: "height.npy",
            source,
        })?;

        let fps = fps_arr
            .first_as_f64()
            .map_err(|source| ClipError::Malformed { entry: "fps.npy", source })? as f32;
        let width = width_arr
            .first_as_f64()
            .map_err(|source| ClipError::Malformed { entry: "width.npy", source })? as usize;
        let height = height_arr
            .first_as_f64()
            .map_err(|source| ClipError::Malformed { entry: "height.npy", source })? as usize;

        let frame_bytes = width * height * 3;
        if frame_bytes == 0 || frames_arr.data.len() % frame_bytes != 0 {
            return Err(ClipError::SizeMismatch {
                actual: frames_arr.data.len(),
                frame_bytes,
            });
        }
        let num_frames = frames_arr.data.len() / frame_bytes;

        Ok(Self {
            frames: frames_arr.data,
            frame_bytes,
            num_frames,
            fps,
            width,
            height,
        })
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn frame(&self, index: usize) -> &[u8] {
        let start = index * self.frame_bytes;
        &self.frames[start..start + self.frame_bytes]
    }
}

fn read_entry(
    archive: &mut zip::ZipArchive<File>,
    name: &'static str,
) -> Result<Vec<u8>, ClipError> {
    let mut entry = archive.by_name(name).map_err(|_| ClipError::MissingEntry(name))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .map_err(|source| ClipError::Open {
            path: name.to_string(),
            source,
        })?;
    Ok(buf)
}

/// Optional range/speed/brightness/repeat controls layered over a `Clip`'s
/// own playback rate (spec §4.7).
#[derive(Debug, Clone, Copy)]
pub struct PlaybackOptions {
    pub target_fps: Option<f32>,
    /// `Some(x)` with `x <= 1.0` is a fraction; `x > 1.0` is a 0-255 scale,
    /// matching spec §4.7's "brightness/255 if >1 else brightness" rule.
    pub brightness: Option<f32>,
    pub start: usize,
    pub end: Option<usize>,
    pub speed: f32,
    /// `None` loops forever; `Some(n)` plays the range `n` times.
    pub repeat: Option<u32>,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            target_fps: None,
            brightness: None,
            start: 0,
            end: None,
            speed: 1.0,
            repeat: Some(1),
        }
    }
}

pub struct ClipPlayer<'a> {
    clip: &'a Clip,
    options: PlaybackOptions,
    scratch: Vec<u8>,
}

impl<'a> ClipPlayer<'a> {
    pub fn new(clip: &'a Clip, options: PlaybackOptions) -> Self {
        Self {
            clip,
            options,
            scratch: vec![0u8; clip.frame_bytes],
        }
    }

    fn frame_interval(&self) -> Duration {
        let fps = self.options.target_fps.unwrap_or(self.clip.fps).max(0.001);
        let speed = if self.options.speed > 0.0 {
            self.options.speed
        } else {
            1.0
        };
        Duration::from_secs_f64(1.0 / (fps as f64 * speed as f64))
    }

    fn range(&self) -> (usize, usize) {
        let start = self.options.start.min(self.clip.num_frames);
        let end = self
            .options
            .end
            .unwrap_or(self.clip.num_frames)
            .min(self.clip.num_frames)
            .max(start);
        (start, end)
    }

    /// Play until `stop` is set or the configured repeat count is
    /// exhausted. Returns the number of frames written.
    pub fn run(&mut self, writer: &mut Writer, stop: &AtomicBool) -> usize {
        let (start, end) = self.range();
        let interval = self.frame_interval();
        let mut written = 0;
        let mut passes = 0u32;

        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if let Some(limit) = self.options.repeat {
                if passes >= limit {
                    break;
                }
            }

            let mut next_due = Instant::now();
            for index in start..end {
                if stop.load(Ordering::Relaxed) {
                    return written;
                }
                let source = self.clip.frame(index);
                let frame = match self.options.brightness {
                    Some(b) => {
                        apply_brightness(source, b, &mut self.scratch);
                        &self.scratch[..]
                    }
                    None => source,
                };
                writer.write(frame);
                written += 1;

                next_due += interval;
                let now = Instant::now();
                if next_due > now {
                    std::thread::sleep(next_due - now);
                } else {
                    next_due = now;
                }
            }
            passes += 1;
        }
        written
    }
}

fn apply_brightness(source: &[u8], brightness: f32, out: &mut [u8]) {
    let scale = if brightness > 1.0 {
        brightness / 255.0
    } else {
        brightness
    };
    for (dst, &src) in out.iter_mut().zip(source.iter()) {
        *dst = ((src as f32 * scale).round().clamp(0.0, 255.0)) as u8;
    }
}
