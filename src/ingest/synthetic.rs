//! Synthetic frame source.
//!
//! Stands in for the camera session on `stub://` URLs. Frames are generated in
//! memory, stamped at capture time, and counted back in through their release
//! hooks so tests and the daemon can verify nothing is leaked upstream.

use anyhow::{anyhow, Result};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::frame::{Frame, Rotation};
use crate::ingest::PixelFormat;
use crate::Timestamp;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Must use the `stub://` scheme.
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub format: PixelFormat,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://driver_cam".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
            rotation: Rotation::Deg0,
            format: PixelFormat::Rgb24,
        }
    }
}

/// Statistics for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticStats {
    pub frames_captured: u64,
    pub frames_released: u64,
    pub url: String,
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    released: Arc<AtomicU64>,
    /// Slowly drifting brightness so consecutive frames differ.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source requires a stub:// url, got '{}'",
                config.url
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source dimensions must be non-zero"));
        }
        Ok(Self {
            config,
            frame_count: 0,
            released: Arc::new(AtomicU64::new(0)),
            scene_state: 0,
        })
    }

    /// Synthetic sources are always "connected".
    pub fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    pub fn target_fps(&self) -> u32 {
        self.config.target_fps
    }

    /// Capture the next frame stamped with the current wall-clock time.
    pub fn next_frame(&mut self) -> Result<Frame> {
        self.next_frame_at(Timestamp::now())
    }

    /// Capture the next frame with an explicit capture time (simulated clocks).
    pub fn next_frame_at(&mut self, captured_at: Timestamp) -> Result<Frame> {
        self.frame_count += 1;
        if self.frame_count.is_multiple_of(50) {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let pixels = self.generate_pixels();
        let released = self.released.clone();
        Ok(Frame::new(
            pixels,
            self.config.format,
            self.config.width,
            self.config.height,
            self.config.rotation,
            captured_at,
        )
        .with_release_hook(move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height) as usize;
        let len = match self.config.format {
            PixelFormat::Rgb24 => pixel_count * 3,
            PixelFormat::Nv12 | PixelFormat::Nv21 => pixel_count + pixel_count / 2,
        };
        let mut rng = rand::thread_rng();
        let base = self.scene_state as u64;
        (0..len)
            .map(|i| ((i as u64 + base) % 200) as u8 + rng.gen_range(0..8))
            .collect()
    }

    pub fn is_healthy(&self) -> bool {
        true
    }

    pub fn stats(&self) -> SyntheticStats {
        SyntheticStats {
            frames_captured: self.frame_count,
            frames_released: self.released.load(Ordering::SeqCst),
            url: self.config.url.clone(),
        }
    }
}
