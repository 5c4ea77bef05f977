use crate::geometry::BoundingBox;
use serde::{Deserialize, Serialize};

/// One raw model output row before thresholding and suppression.
#[derive(Debug, Clone)]
pub struct DetectionCandidate {
    pub bbox: BoundingBox,
    pub objectness: f32,
    pub class_scores: Vec<f32>,
}

impl DetectionCandidate {
    /// Index and score of the strongest class, if any scores are present.
    pub fn best_class(&self) -> Option<(usize, f32)> {
        self.class_scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    pub fn final_score(&self) -> f32 {
        self.best_class()
            .map(|(_, score)| self.objectness * score)
            .unwrap_or(0.0)
    }
}

/// A surviving detection after thresholding and NMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// The post-NMS survivor set for one frame, in selection (descending score)
/// order. Offers both the structured view and the column-oriented legacy
/// view expected by older consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionBatch {
    detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Highest confidence in the batch, 0.0 when empty.
    pub fn top_confidence(&self) -> f32 {
        self.detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0, f32::max)
    }

    /// Column-oriented view (`boxes[]`, `classes[]`, `scores[]`).
    pub fn columns(&self) -> DetectionColumns {
        DetectionColumns {
            boxes: self
                .detections
                .iter()
                .map(|d| [d.bbox.x1, d.bbox.y1, d.bbox.x2, d.bbox.y2])
                .collect(),
            classes: self.detections.iter().map(|d| d.label.clone()).collect(),
            scores: self.detections.iter().map(|d| d.confidence).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionColumns {
    pub boxes: Vec<[f32; 4]>,
    pub classes: Vec<String>,
    pub scores: Vec<f32>,
}
