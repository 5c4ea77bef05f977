mod detection;
mod frame;

pub use detection::{Detection, DetectionBatch, DetectionCandidate, DetectionColumns};
pub use frame::CameraFrame;
