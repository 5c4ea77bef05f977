use super::backend::{BackendLoader, DetectorBackend};
use super::decode;
use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::types::{CameraFrame, DetectionBatch};
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Unloaded,
    Loading,
    Ready,
}

/// Per-frame inference pipeline around an opaque detector backend.
///
/// Owns the backend lifecycle (`Unloaded -> Loading -> Ready`) and the
/// preprocess / infer / decode / suppress chain. Runs inside the detector
/// worker task; nothing outside that task touches it.
pub struct DetectionPipeline {
    name: String,
    loader: Arc<dyn BackendLoader>,
    backend: Option<Box<dyn DetectorBackend>>,
    state: BackendState,
    config: DetectorConfig,
}

impl DetectionPipeline {
    pub fn new(name: impl Into<String>, loader: Arc<dyn BackendLoader>, config: DetectorConfig) -> Self {
        Self {
            name: name.into(),
            loader,
            backend: None,
            state: BackendState::Unloaded,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BackendState {
        self.state
    }

    /// Load a backend, replacing any previously loaded one.
    ///
    /// A load already in flight is not duplicated. One warm-up inference on
    /// a zero-filled input pays initialization cost up front, so the first
    /// real frame is not the slow one. Failures leave the pipeline
    /// `Unloaded` and are reported as values, never panics.
    pub async fn load_backend(&mut self, source_ref: &str) -> Result<(), DetectorError> {
        if self.state == BackendState::Loading {
            debug!(detector = %self.name, "load already in flight, ignoring duplicate");
            return Ok(());
        }
        self.state = BackendState::Loading;
        self.backend = None;

        let mut backend = match self.loader.load(source_ref).await {
            Ok(backend) => backend,
            Err(e) => {
                self.state = BackendState::Unloaded;
                return Err(e);
            }
        };

        let warmup_input = vec![0.0f32; backend.input_shape().iter().product()];
        if let Err(e) = backend.infer(&warmup_input).await {
            warn!(detector = %self.name, "warm-up inference failed: {}", e);
            self.state = BackendState::Unloaded;
            return Err(e);
        }

        info!(detector = %self.name, source_ref, "backend loaded and warmed up");
        self.backend = Some(backend);
        self.state = BackendState::Ready;
        Ok(())
    }

    /// Run one frame through the backend.
    ///
    /// Returns `Ok(None)` when no backend is ready (the frame is silently
    /// ignored). Any inference failure is reported per frame; the next call
    /// proceeds normally.
    pub async fn process_frame(
        &mut self,
        frame: &CameraFrame,
    ) -> Result<Option<DetectionBatch>, DetectorError> {
        if self.state != BackendState::Ready {
            debug!(detector = %self.name, "dropping frame, backend not ready");
            return Ok(None);
        }
        let backend = self.backend.as_mut().ok_or(DetectorError::BackendMissing)?;

        let (width, height) = backend.input_size();
        let input = preprocess(frame.image(), width, height);
        let rows = backend
            .infer(&input)
            .await
            .map_err(|e| DetectorError::Inference {
                detector: self.name.clone(),
                reason: e.to_string(),
            })?;

        let candidates = decode::decode_candidates(&rows);
        let batch = decode::postprocess(candidates, backend.labels(), &self.config);
        debug!(
            detector = %self.name,
            frame = %frame.id(),
            detections = batch.len(),
            "frame processed"
        );
        Ok(Some(batch))
    }
}

/// Resize to the backend's fixed input resolution, normalize pixel values to
/// [0, 1], and lay the result out as a batch-of-one `[1, H, W, 3]` tensor.
pub fn preprocess(image: &DynamicImage, width: u32, height: u32) -> Vec<f32> {
    let resized = image
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8();
    let mut input = Vec::with_capacity(width as usize * height as usize * 3);
    for pixel in resized.pixels() {
        input.push(pixel[0] as f32 / 255.0);
        input.push(pixel[1] as f32 / 255.0);
        input.push(pixel[2] as f32 / 255.0);
    }
    input
}
