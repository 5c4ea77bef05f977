use super::backend::BackendLoader;
use super::pipeline::DetectionPipeline;
use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::types::{CameraFrame, DetectionBatch, DetectionColumns};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Inbound messages for a detector worker.
#[derive(Debug)]
pub enum DetectorRequest {
    LoadBackend { source_ref: String },
    ProcessFrame { frame: CameraFrame },
}

/// Outbound messages from a detector worker.
#[derive(Debug, Clone)]
pub enum DetectorResponse {
    BackendLoaded {
        success: bool,
        error: Option<String>,
    },
    Detections(DetectionEnvelope),
    Error {
        detector: String,
        message: String,
    },
}

/// Detection result envelope handed across the worker boundary.
///
/// Carries the survivor set twice: structured, and as the column-oriented
/// legacy view older consumers still expect.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionEnvelope {
    pub modality: String,
    pub batch: DetectionBatch,
    pub columns: DetectionColumns,
    pub confidence: f32,
    pub timestamp_ms: i64,
}

impl DetectionEnvelope {
    pub fn new(modality: impl Into<String>, batch: DetectionBatch, timestamp_ms: i64) -> Self {
        Self {
            modality: modality.into(),
            columns: batch.columns(),
            confidence: batch.top_confidence(),
            batch,
            timestamp_ms,
        }
    }
}

/// Runs a [`DetectionPipeline`] on its own tokio task.
///
/// All communication is message passing over the request/response channels;
/// frames cross the boundary as cheap handle copies and nothing shares
/// mutable state with the pipeline.
pub struct DetectorWorker;

impl DetectorWorker {
    pub fn spawn(
        name: impl Into<String>,
        loader: Arc<dyn BackendLoader>,
        config: DetectorConfig,
    ) -> (DetectorHandle, mpsc::Receiver<DetectorResponse>) {
        let name = name.into();
        let (request_tx, mut request_rx) = mpsc::channel::<DetectorRequest>(32);
        let (response_tx, response_rx) = mpsc::channel::<DetectorResponse>(32);

        let worker_name = name.clone();
        tokio::spawn(async move {
            let mut pipeline = DetectionPipeline::new(worker_name.clone(), loader, config);
            while let Some(request) = request_rx.recv().await {
                let response = match request {
                    DetectorRequest::LoadBackend { source_ref } => {
                        match pipeline.load_backend(&source_ref).await {
                            Ok(()) => Some(DetectorResponse::BackendLoaded {
                                success: true,
                                error: None,
                            }),
                            Err(e) => Some(DetectorResponse::BackendLoaded {
                                success: false,
                                error: Some(e.to_string()),
                            }),
                        }
                    }
                    DetectorRequest::ProcessFrame { frame } => {
                        let timestamp_ms = frame.captured_at_ms();
                        match pipeline.process_frame(&frame).await {
                            Ok(Some(batch)) => Some(DetectorResponse::Detections(
                                DetectionEnvelope::new(worker_name.clone(), batch, timestamp_ms),
                            )),
                            // Backend not ready, frame silently ignored.
                            Ok(None) => None,
                            Err(e) => Some(DetectorResponse::Error {
                                detector: worker_name.clone(),
                                message: e.to_string(),
                            }),
                        }
                    }
                };
                if let Some(response) = response {
                    if response_tx.send(response).await.is_err() {
                        break;
                    }
                }
            }
            debug!(detector = %worker_name, "detector worker stopped");
        });

        (DetectorHandle { name, request_tx }, response_rx)
    }
}

/// Cheap-clone client handle for a spawned detector worker.
#[derive(Clone)]
pub struct DetectorHandle {
    name: String,
    request_tx: mpsc::Sender<DetectorRequest>,
}

impl DetectorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn load_backend(&self, source_ref: impl Into<String>) -> Result<(), DetectorError> {
        self.request_tx
            .send(DetectorRequest::LoadBackend {
                source_ref: source_ref.into(),
            })
            .await
            .map_err(|_| DetectorError::ChannelClosed)
    }

    pub async fn process_frame(&self, frame: CameraFrame) -> Result<(), DetectorError> {
        self.request_tx
            .send(DetectorRequest::ProcessFrame { frame })
            .await
            .map_err(|_| DetectorError::ChannelClosed)
    }

    /// Non-blocking submission for synchronous callers (scheduler handlers).
    /// A full queue drops the frame; the capture contract allows that.
    pub fn try_process_frame(&self, frame: CameraFrame) -> Result<(), DetectorError> {
        match self.request_tx.try_send(DetectorRequest::ProcessFrame { frame }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(detector = %self.name, "worker queue full, dropping frame");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DetectorError::ChannelClosed),
        }
    }
}
