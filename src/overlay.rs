//! Overlay Cache.
//!
//! Holds the single live `OverlayCacheEntry`: the latest resolved detection set
//! and the time it was captured. The worker is the only writer; render
//! contexts read snapshots concurrently.
//!
//! Entries are immutable once published and handed out as `Arc`s, so a reader
//! sees either the previous entry or the new one, never a mix of detections
//! from one tick and a timestamp from another. Staleness is a pure function of
//! `now - captured_at`; pausing detection for any reason expires the overlay.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::detect::{BoundingBox, Detection};
use crate::Timestamp;

/// Maximum age of a cached detection set before it is treated as absent.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_millis(1000);

/// One published detection set.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayCacheEntry {
    pub detections: Vec<Detection>,
    pub captured_at: Timestamp,
    /// Oriented frame size the detections were taken from.
    pub frame_width: u32,
    pub frame_height: u32,
}

impl OverlayCacheEntry {
    /// Boxes and captions mapped onto a display surface of the given size.
    pub fn scaled_to(&self, display_width: u32, display_height: u32) -> Vec<(BoundingBox, String)> {
        self.detections
            .iter()
            .map(|d| {
                (
                    d.bbox.scale(display_width as f32, display_height as f32),
                    d.caption(),
                )
            })
            .collect()
    }

    pub fn age(&self, now: Timestamp) -> Duration {
        now.since(self.captured_at)
    }
}

pub struct OverlayCache {
    entry: RwLock<Option<Arc<OverlayCacheEntry>>>,
    staleness_window: Duration,
}

impl OverlayCache {
    pub fn new(staleness_window: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            staleness_window,
        }
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    /// Replace the live entry. This is the only mutation path besides `clear`/`sweep`.
    pub fn update(
        &self,
        detections: Vec<Detection>,
        frame_dims: (u32, u32),
        now: Timestamp,
    ) {
        let entry = Arc::new(OverlayCacheEntry {
            detections,
            captured_at: now,
            frame_width: frame_dims.0,
            frame_height: frame_dims.1,
        });
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);
    }

    /// Current snapshot, if one exists, is non-empty, and is within the staleness window.
    pub fn read(&self, now: Timestamp) -> Option<Arc<OverlayCacheEntry>> {
        let guard = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        let entry = guard.as_ref()?;
        if entry.detections.is_empty() || entry.age(now) > self.staleness_window {
            return None;
        }
        Some(entry.clone())
    }

    /// Drop the live entry immediately, regardless of its age.
    pub fn clear(&self) {
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Drop the live entry if it has expired. Returns true when one was dropped.
    ///
    /// Run periodically by the staleness sweeper so the overlay disappears even
    /// when no frames arrive.
    pub fn sweep(&self, now: Timestamp) -> bool {
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        let expired = guard
            .as_ref()
            .is_some_and(|entry| entry.age(now) > self.staleness_window);
        if expired {
            *guard = None;
        }
        expired
    }

    /// True when no entry is held (expired-but-unswept entries count as held).
    pub fn is_empty(&self) -> bool {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Default for OverlayCache {
    fn default() -> Self {
        Self::new(DEFAULT_STALENESS_WINDOW)
    }
}
