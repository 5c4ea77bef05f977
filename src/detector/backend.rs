use crate::error::DetectorError;
use async_trait::async_trait;

/// An opaque inference backend.
///
/// The model format and numerical architecture stay behind this trait; the
/// pipeline only relies on the pre/post-processing contract: input is a
/// batch-of-one RGB tensor normalized to [0, 1], output rows are
/// `[cx, cy, w, h, objectness, class_score...]` in normalized coordinates.
#[async_trait]
pub trait DetectorBackend: Send {
    /// Fixed input resolution the backend expects, (width, height).
    fn input_size(&self) -> (u32, u32);

    /// Class labels, indexed by class score position.
    fn labels(&self) -> &[String];

    /// Tensor shape of the input buffer: `[batch, height, width, channels]`.
    fn input_shape(&self) -> [usize; 4] {
        let (width, height) = self.input_size();
        [1, height as usize, width as usize, 3]
    }

    async fn infer(&mut self, input: &[f32]) -> Result<Vec<Vec<f32>>, DetectorError>;
}

/// Loads a [`DetectorBackend`] from an opaque source reference (a file path,
/// a model registry key, whatever the deployment provides).
#[async_trait]
pub trait BackendLoader: Send + Sync {
    async fn load(&self, source_ref: &str) -> Result<Box<dyn DetectorBackend>, DetectorError>;
}
