use crate::geometry::BoundingBox;
use crate::types::DetectionBatch;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Discriminant for event routing, throttling, and confidence floors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerceptKind {
    Face,
    FaceLost,
    Gesture,
    Object,
    Pose,
    Emotion,
}

impl std::fmt::Display for PerceptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PerceptKind::Face => "face",
            PerceptKind::FaceLost => "face_lost",
            PerceptKind::Gesture => "gesture",
            PerceptKind::Object => "object",
            PerceptKind::Pose => "pose",
            PerceptKind::Emotion => "emotion",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// Closed set of percept payloads, one variant per modality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PerceptPayload {
    Face {
        entity_id: String,
        bbox: BoundingBox,
    },
    /// Derived transition: the entity went unseen past the grace period.
    FaceLost {
        entity_id: String,
    },
    Gesture {
        name: String,
        handedness: Handedness,
    },
    Object {
        batch: DetectionBatch,
    },
    Pose {
        posture: String,
        keypoints: Vec<Keypoint>,
    },
    Emotion {
        emotion: String,
        intensity: f32,
    },
}

impl PerceptPayload {
    pub fn kind(&self) -> PerceptKind {
        match self {
            PerceptPayload::Face { .. } => PerceptKind::Face,
            PerceptPayload::FaceLost { .. } => PerceptKind::FaceLost,
            PerceptPayload::Gesture { .. } => PerceptKind::Gesture,
            PerceptPayload::Object { .. } => PerceptKind::Object,
            PerceptPayload::Pose { .. } => PerceptKind::Pose,
            PerceptPayload::Emotion { .. } => PerceptKind::Emotion,
        }
    }

    /// Tracked-entity identifier, for payloads that carry one.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            PerceptPayload::Face { entity_id, .. } => Some(entity_id),
            PerceptPayload::FaceLost { entity_id } => Some(entity_id),
            _ => None,
        }
    }
}

/// A normalized percept. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptEvent {
    pub payload: PerceptPayload,
    pub confidence: f32,
    pub timestamp_ms: i64,
}

impl PerceptEvent {
    pub fn new(payload: PerceptPayload, confidence: f32) -> Self {
        Self::at(payload, confidence, Utc::now().timestamp_millis())
    }

    /// Construct with an explicit clock value; the bus treats the event's
    /// timestamp as "now" so replays and tests stay deterministic.
    pub fn at(payload: PerceptPayload, confidence: f32, timestamp_ms: i64) -> Self {
        Self {
            payload,
            confidence,
            timestamp_ms,
        }
    }

    pub fn kind(&self) -> PerceptKind {
        self.payload.kind()
    }
}
