pub mod bus;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod exclusive;
pub mod geometry;
pub mod scheduler;
pub mod types;

pub use bus::{PerceptEvent, PerceptEventBus, PerceptKind, PerceptPayload, Topic};
pub use config::PerceptionConfig;
pub use detector::{BackendLoader, DetectorBackend, DetectorHandle, DetectorService};
pub use engine::{PerceptionEngine, PerceptionEngineBuilder};
pub use error::{DetectorError, PerceptError};
pub use exclusive::ExecutionSerializer;
pub use geometry::{iou, nms, BoundingBox};
pub use scheduler::{FrameScheduler, SchedulerHandle};
pub use types::{CameraFrame, Detection, DetectionBatch};

use tracing::Level;

/// Convenience subscriber setup for binaries and examples.
pub fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}
