use crate::bus::PerceptKind;
use crate::error::PerceptError;
use serde::Deserialize;

/// Top level configuration, aggregating the per-subsystem configs.
///
/// Values come from `Default`, an optional `percept.toml` next to the
/// process, and `PERCEPT__`-prefixed environment variables, in that order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub scheduler: SchedulerConfig,
    pub detector: DetectorConfig,
    pub bus: BusConfig,
}

impl PerceptionConfig {
    pub fn load() -> Result<Self, PerceptError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("percept").required(false))
            .add_source(config::Environment::with_prefix("PERCEPT").separator("__"))
            .build()
            .map_err(|e| PerceptError::Config(e.to_string()))?;
        let loaded: PerceptionConfig = settings
            .try_deserialize()
            .map_err(|e| PerceptError::Config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), PerceptError> {
        self.scheduler.validate()?;
        self.detector.validate()?;
        self.bus.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum estimated compute time a single scheduling step may spend.
    pub max_budget_ms: f64,
    /// Interval of the driver loop standing in for the host frame callback.
    pub frame_interval_ms: u64,
}

impl SchedulerConfig {
    fn validate(&self) -> Result<(), PerceptError> {
        if self.max_budget_ms <= 0.0 {
            return Err(PerceptError::Config(
                "scheduler.max_budget_ms must be positive".to_string(),
            ));
        }
        if self.frame_interval_ms == 0 {
            return Err(PerceptError::Config(
                "scheduler.frame_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_budget_ms: 12.0,
            frame_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Candidates scoring below this are discarded before NMS.
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl DetectorConfig {
    fn validate(&self) -> Result<(), PerceptError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PerceptError::Config(
                "detector.confidence_threshold must be in [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(PerceptError::Config(
                "detector.iou_threshold must be in [0, 1]".to_string(),
            ));
        }
        if self.max_detections == 0 {
            return Err(PerceptError::Config(
                "detector.max_detections must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub confidence_floors: ConfidenceFloors,
    pub throttle: ThrottleWindows,
    /// How long an entity may go unseen before a lost event is synthesized.
    pub lost_grace_ms: i64,
}

impl BusConfig {
    fn validate(&self) -> Result<(), PerceptError> {
        if self.lost_grace_ms <= 0 {
            return Err(PerceptError::Config(
                "bus.lost_grace_ms must be positive".to_string(),
            ));
        }
        if self.throttle.default_ms < 0 {
            return Err(PerceptError::Config(
                "bus.throttle.default_ms must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            confidence_floors: ConfidenceFloors::default(),
            throttle: ThrottleWindows::default(),
            lost_grace_ms: 2_000,
        }
    }
}

/// Per-kind minimum confidence. A kind without a floor delivers everything.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfidenceFloors {
    pub face: Option<f32>,
    pub gesture: Option<f32>,
    pub object: Option<f32>,
    pub pose: Option<f32>,
    pub emotion: Option<f32>,
}

impl ConfidenceFloors {
    pub fn floor(&self, kind: PerceptKind) -> Option<f32> {
        match kind {
            PerceptKind::Face => self.face,
            PerceptKind::Gesture => self.gesture,
            PerceptKind::Object => self.object,
            PerceptKind::Pose => self.pose,
            PerceptKind::Emotion => self.emotion,
            // Derived transition events are never confidence filtered.
            PerceptKind::FaceLost => None,
        }
    }
}

impl Default for ConfidenceFloors {
    fn default() -> Self {
        Self {
            face: None,
            gesture: None,
            object: Some(0.7),
            pose: None,
            emotion: None,
        }
    }
}

/// Minimum interval between accepted emissions of the same kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleWindows {
    pub default_ms: i64,
    pub face_ms: Option<i64>,
    pub gesture_ms: Option<i64>,
    pub object_ms: Option<i64>,
    pub pose_ms: Option<i64>,
    pub emotion_ms: Option<i64>,
}

impl ThrottleWindows {
    pub fn window(&self, kind: PerceptKind) -> i64 {
        let override_ms = match kind {
            PerceptKind::Face => self.face_ms,
            PerceptKind::Gesture => self.gesture_ms,
            PerceptKind::Object => self.object_ms,
            PerceptKind::Pose => self.pose_ms,
            PerceptKind::Emotion => self.emotion_ms,
            PerceptKind::FaceLost => None,
        };
        override_ms.unwrap_or(self.default_ms)
    }
}

impl Default for ThrottleWindows {
    fn default() -> Self {
        Self {
            default_ms: 250,
            face_ms: None,
            gesture_ms: None,
            object_ms: None,
            pose_ms: None,
            emotion_ms: None,
        }
    }
}
