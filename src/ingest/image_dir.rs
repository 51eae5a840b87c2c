//! Local image-directory frame source.
//!
//! Replays JPEG/PNG stills from a local directory in file-name order, which is
//! how recorded driver sessions are fed through the pipeline offline. No
//! network access; decoding happens in memory.

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::path::{Path, PathBuf};

use crate::frame::{Frame, Rotation};
use crate::ingest::PixelFormat;
use crate::Timestamp;

/// Configuration for an image-directory source.
#[derive(Clone, Debug)]
pub struct ImageDirConfig {
    pub path: PathBuf,
    pub target_fps: u32,
    /// Start over after the last image instead of reporting exhaustion.
    pub loop_playback: bool,
    pub rotation: Rotation,
}

pub struct ImageDirSource {
    config: ImageDirConfig,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
}

impl ImageDirSource {
    pub fn new(config: ImageDirConfig) -> Result<Self> {
        let files = list_images(&config.path)?;
        if files.is_empty() {
            return Err(anyhow!(
                "no .jpg/.jpeg/.png images in {}",
                config.path.display()
            ));
        }
        Ok(Self {
            config,
            files,
            cursor: 0,
            frame_count: 0,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        log::info!(
            "ImageDirSource: replaying {} images from {}",
            self.files.len(),
            self.config.path.display()
        );
        Ok(())
    }

    pub fn target_fps(&self) -> u32 {
        self.config.target_fps
    }

    /// Decode the next image. Returns `Ok(None)` once exhausted without looping.
    ///
    /// A file that fails to decode is reported as an error and skipped on the
    /// next call.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.cursor >= self.files.len() {
            if !self.config.loop_playback {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = self.files[self.cursor].clone();
        self.cursor += 1;

        let (pixels, width, height) = decode_image(&path)?;
        self.frame_count += 1;
        Ok(Some(Frame::new(
            pixels,
            PixelFormat::Rgb24,
            width,
            height,
            self.config.rotation,
            Timestamp::now(),
        )))
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read image directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
            .unwrap_or(false);
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn decode_image(path: &Path) -> Result<(Vec<u8>, u32, u32)> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let image = image::load_from_memory(&bytes)
        .with_context(|| format!("decode {}", path.display()))?;
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    Ok((rgb.into_raw(), width, height))
}
