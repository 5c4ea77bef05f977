use thiserror::Error;

// Main application error type

#[derive(Error, Debug)]
pub enum PerceptError {
    #[error("Detector Error: {0}")]
    Detector(#[from] DetectorError),
    #[error("Frame Error: {0}")]
    Frame(#[from] FrameError),
    #[error("Bus Error: {0}")]
    Bus(#[from] BusError),
    #[error("Configuration Error: {0}")]
    Config(String),
}

// Detector backend / inference error type
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Failed to load backend from {source_ref}: {reason}")]
    LoadFailed { source_ref: String, reason: String },
    #[error("No backend is loaded.")]
    BackendMissing,
    #[error("Inference failed in {detector}: {reason}")]
    Inference { detector: String, reason: String },
    #[error("Detector worker channel is closed.")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Pixel buffer has {actual} bytes, expected {expected} for {width}x{height} RGB")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

#[derive(Error, Debug)]
pub enum BusError {
    #[error("No subscription {id} registered for topic {topic}")]
    UnknownSubscription { id: u64, topic: String },
}
