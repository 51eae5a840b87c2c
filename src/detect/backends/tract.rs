#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, RawDetection};

const DEFAULT_MIN_SCORE: f32 = 0.25;
const DEFAULT_MAX_DETECTIONS: usize = 50;

/// Tract-based backend for YOLOv5-style ONNX models.
///
/// Loads a local model file and a newline-separated labels file. Frames are
/// resized (nearest neighbour) to the model input; output rows of
/// `[cx, cy, w, h, objectness, class scores...]` in model-input pixels are
/// mapped back onto the frame.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    labels: Vec<String>,
    input_width: u32,
    input_height: u32,
    min_score: f32,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model and its labels from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>, L: AsRef<Path>>(
        model_path: P,
        labels_path: L,
        input_width: u32,
        input_height: u32,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let labels_path = labels_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let labels = std::fs::read_to_string(labels_path)
            .with_context(|| format!("failed to read labels from {}", labels_path.display()))?
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>();
        if labels.is_empty() {
            return Err(anyhow!("labels file {} is empty", labels_path.display()));
        }

        Ok(Self {
            model,
            labels,
            input_width,
            input_height,
            min_score: DEFAULT_MIN_SCORE,
            max_detections: DEFAULT_MAX_DETECTIONS,
        })
    }

    /// Override the pre-filter score below which candidates are discarded.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        if pixels.len() != expected_len || width == 0 || height == 0 {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let (iw, ih) = (self.input_width as usize, self.input_height as usize);
        let (fw, fh) = (width as usize, height as usize);
        let input =
            tract_ndarray::Array4::from_shape_fn((1, 3, ih, iw), |(_, channel, y, x)| {
                let sx = x * fw / iw;
                let sy = y * fh / ih;
                pixels[(sy * fw + sx) * 3 + channel] as f32 / 255.0
            });

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let (rows, stride) = match shape.as_slice() {
            [1, rows, stride] if *stride > 5 => (*rows, *stride),
            other => return Err(anyhow!("unexpected model output shape {:?}", other)),
        };
        let data = view
            .as_slice()
            .ok_or_else(|| anyhow!("model output is not contiguous"))?;

        let sx = width as f32 / self.input_width as f32;
        let sy = height as f32 / self.input_height as f32;
        let mut detections = decode_rows(data, rows, stride, self.min_score)
            .into_iter()
            .filter_map(|row| {
                let label = self.labels.get(row.class)?.clone();
                Some(RawDetection::new(label, row.score, row.bbox.scale(sx, sy)))
            })
            .collect::<Vec<_>>();
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        detections.truncate(self.max_detections);
        Ok(detections)
    }
}

struct DecodedRow {
    class: usize,
    score: f32,
    bbox: BoundingBox,
}

fn decode_rows(data: &[f32], rows: usize, stride: usize, min_score: f32) -> Vec<DecodedRow> {
    data.chunks_exact(stride)
        .take(rows)
        .filter_map(|row| {
            let objectness = row[4];
            let (class, class_score) = row[5..]
                .iter()
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))?;
            let score = objectness * class_score;
            if !score.is_finite() || score < min_score {
                return None;
            }
            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            Some(DecodedRow {
                class,
                score,
                bbox: BoundingBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
            })
        })
        .collect()
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rows_picks_best_class_and_filters_low_scores() {
        #[rustfmt::skip]
        let data = [
            // cx, cy, w, h, obj, awake, microsleep
            50.0, 50.0, 20.0, 10.0, 0.9, 0.1, 0.8,
            10.0, 10.0, 4.0, 4.0, 0.2, 0.5, 0.5,
        ];
        let rows = decode_rows(&data, 2, 7, 0.25);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].class, 1);
        assert!((rows[0].score - 0.72).abs() < 1e-6);
        assert_eq!(rows[0].bbox, BoundingBox::new(40.0, 45.0, 60.0, 55.0));
    }
}
