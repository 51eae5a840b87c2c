//! Frames as delivered by the upstream source.
//!
//! - `Frame`: decoded pixels plus capture metadata. Holds an optional release
//!   hook that returns the buffer to its producer exactly once.
//! - `Rotation`: sensor rotation reported with each frame.
//! - `InputSource`: which camera feeds the pipeline (front is mirrored).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::ingest::PixelFormat;
use crate::Timestamp;

type ReleaseHook = Box<dyn FnOnce() + Send>;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded frame from the frame source.
///
/// The scheduler calls `release()` once processing is done on every path. A
/// frame dropped without an explicit release (e.g. rejected by a full worker
/// queue) still runs its release hook, so the upstream source never backs up.
pub struct Frame {
    pixels: Vec<u8>,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub captured_at: Timestamp,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn new(
        pixels: Vec<u8>,
        format: PixelFormat,
        width: u32,
        height: u32,
        rotation: Rotation,
        captured_at: Timestamp,
    ) -> Self {
        Self {
            pixels,
            format,
            width,
            height,
            rotation,
            captured_at,
            release: None,
        }
    }

    /// Attach the callback that signals "done with this frame" upstream.
    pub fn with_release_hook<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Width and height after applying `rotation`.
    pub fn oriented_dims(&self) -> (u32, u32) {
        if self.rotation.swaps_axes() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    /// Signal the source that this frame may be recycled.
    pub fn release(mut self) {
        self.run_release_hook();
    }

    fn run_release_hook(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.run_release_hook();
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content is never printed.
        f.debug_struct("Frame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation", &self.rotation)
            .field("captured_at", &self.captured_at)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Orientation
// ----------------------------------------------------------------------------

/// Clockwise rotation needed to display the frame upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            _ => Err(anyhow!("unsupported rotation {} degrees", degrees)),
        }
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Camera feeding the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    #[default]
    Rear,
    Front,
}

impl InputSource {
    /// Front-facing frames are mirrored horizontally before detection.
    pub fn mirrored(self) -> bool {
        matches!(self, InputSource::Front)
    }

    pub fn toggled(self) -> Self {
        match self {
            InputSource::Rear => InputSource::Front,
            InputSource::Front => InputSource::Rear,
        }
    }
}

impl FromStr for InputSource {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rear" | "back" => Ok(InputSource::Rear),
            "front" => Ok(InputSource::Front),
            other => Err(anyhow!("unknown input source '{}' (expected rear|front)", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn make_frame(counter: &Arc<AtomicUsize>) -> Frame {
        let counter = counter.clone();
        Frame::new(
            vec![0u8; 12],
            PixelFormat::Rgb24,
            2,
            2,
            Rotation::Deg0,
            Timestamp::from_millis(0),
        )
        .with_release_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn explicit_release_runs_hook_once() {
        let released = Arc::new(AtomicUsize::new(0));
        make_frame(&released).release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_unreleased_frame_runs_hook() {
        let released = Arc::new(AtomicUsize::new(0));
        drop(make_frame(&released));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        let frame = Frame::new(
            Vec::new(),
            PixelFormat::Rgb24,
            640,
            480,
            Rotation::from_degrees(270).unwrap(),
            Timestamp::default(),
        );
        assert_eq!(frame.oriented_dims(), (480, 640));
        assert!(Rotation::from_degrees(45).is_err());
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Deg270);
    }

    #[test]
    fn input_source_toggles_and_parses() {
        assert!(InputSource::Front.mirrored());
        assert!(!InputSource::Rear.mirrored());
        assert_eq!(InputSource::Rear.toggled(), InputSource::Front);
        assert_eq!("FRONT".parse::<InputSource>().unwrap(), InputSource::Front);
        assert!("side".parse::<InputSource>().is_err());
    }
}
