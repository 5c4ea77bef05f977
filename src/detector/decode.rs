use crate::config::DetectorConfig;
use crate::geometry::{self, BoundingBox};
use crate::types::{Detection, DetectionBatch, DetectionCandidate};
use tracing::trace;

/// Decode raw output rows into candidates.
///
/// Each row is `[cx, cy, w, h, objectness, class_score...]`. Rows shorter
/// than one box plus objectness plus at least one class are skipped.
pub fn decode_candidates(rows: &[Vec<f32>]) -> Vec<DetectionCandidate> {
    rows.iter()
        .filter_map(|row| {
            if row.len() < 6 {
                trace!("skipping malformed output row of length {}", row.len());
                return None;
            }
            Some(DetectionCandidate {
                bbox: BoundingBox::from_center(row[0], row[1], row[2], row[3]),
                objectness: row[4],
                class_scores: row[5..].to_vec(),
            })
        })
        .collect()
}

/// Threshold, convert to corner form, and suppress overlaps.
///
/// Survivors come out in descending score order with coordinates clamped to
/// [0, 1]; candidates whose box degenerates under clamping are dropped.
pub fn postprocess(
    candidates: Vec<DetectionCandidate>,
    labels: &[String],
    config: &DetectorConfig,
) -> DetectionBatch {
    let mut boxes = Vec::new();
    let mut scores = Vec::new();
    let mut class_labels = Vec::new();

    for candidate in candidates {
        let score = candidate.final_score();
        if score < config.confidence_threshold {
            continue;
        }
        let bbox = candidate.bbox.clamped();
        if !bbox.is_valid() {
            continue;
        }
        let label = candidate
            .best_class()
            .and_then(|(index, _)| labels.get(index))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        boxes.push(bbox);
        scores.push(score);
        class_labels.push(label);
    }

    let keep = geometry::nms(&boxes, &scores, config.iou_threshold);
    let detections = keep
        .into_iter()
        .take(config.max_detections)
        .map(|index| Detection {
            label: class_labels[index].clone(),
            confidence: scores[index],
            bbox: boxes[index],
        })
        .collect();
    DetectionBatch::new(detections)
}
