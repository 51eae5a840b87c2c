use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, RawDetection};

type ScriptFn = Box<dyn FnMut(u64) -> Result<Vec<RawDetection>> + Send>;

/// One scripted detector response.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Detections(Vec<RawDetection>),
    Fail(String),
}

/// Deterministic backend for tests, demos and the synthetic daemon source.
///
/// The script receives the zero-based call index and ignores pixel content.
pub struct ScriptedBackend {
    script: ScriptFn,
    calls: u64,
}

impl ScriptedBackend {
    pub fn from_fn<F>(script: F) -> Self
    where
        F: FnMut(u64) -> Result<Vec<RawDetection>> + Send + 'static,
    {
        Self {
            script: Box::new(script),
            calls: 0,
        }
    }

    /// Returns the same detections on every call.
    pub fn constant(detections: Vec<RawDetection>) -> Self {
        Self::from_fn(move |_| Ok(detections.clone()))
    }

    /// Plays `steps` in order, then repeats the last step. An empty script
    /// detects nothing.
    pub fn sequence(steps: Vec<ScriptStep>) -> Self {
        Self::from_fn(move |call| {
            let Some(last) = steps.len().checked_sub(1) else {
                return Ok(Vec::new());
            };
            let idx = (call as usize).min(last);
            match &steps[idx] {
                ScriptStep::Detections(dets) => Ok(dets.clone()),
                ScriptStep::Fail(reason) => Err(anyhow!("scripted failure: {}", reason)),
            }
        })
    }

    /// Alternates `awake_calls` ticks of an alert face with `asleep_calls`
    /// ticks of `label`, centred in a `width`x`height` frame.
    pub fn drowsy_cycle(
        label: &str,
        awake_calls: u64,
        asleep_calls: u64,
        width: u32,
        height: u32,
    ) -> Self {
        let label = label.to_string();
        let period = awake_calls.saturating_add(asleep_calls).max(1);
        let w = width as f32;
        let h = height as f32;
        let face = BoundingBox::new(w * 0.3, h * 0.2, w * 0.7, h * 0.8);
        Self::from_fn(move |call| {
            let detection = if call % period < awake_calls {
                RawDetection::new("awake", 0.82, face)
            } else {
                RawDetection::new(label.clone(), 0.91, face)
            };
            Ok(vec![detection])
        })
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        let call = self.calls;
        self.calls += 1;
        (self.script)(call)
    }
}
