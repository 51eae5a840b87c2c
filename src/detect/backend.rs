use anyhow::Result;

use crate::detect::result::RawDetection;

/// Detector backend trait.
///
/// # Collaborator Boundary
///
/// The object-detection model is an external capability. Implementations:
/// - Receive RGB pixels of the oriented frame (row-major, 3 bytes per pixel)
/// - Return boxes in the pixel coordinates of that same frame
/// - May be slow; the scheduler calls `detect` at most once per detection tick
///   and never concurrently
///
/// Errors are treated as "no result this tick" by the scheduler and never
/// abort the pipeline.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Implementations must treat the pixel slice as read-only and ephemeral.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
