//! Canned backends for exercising the pipeline and worker without real
//! model weights.

use super::backend::{BackendLoader, DetectorBackend};
use crate::error::DetectorError;
use async_trait::async_trait;

pub struct CannedBackend {
    labels: Vec<String>,
    rows: Vec<Vec<f32>>,
    fail_after_warmup: bool,
    calls: usize,
}

#[async_trait]
impl DetectorBackend for CannedBackend {
    fn input_size(&self) -> (u32, u32) {
        (32, 32)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    async fn infer(&mut self, input: &[f32]) -> Result<Vec<Vec<f32>>, DetectorError> {
        assert_eq!(input.len(), self.input_shape().iter().product::<usize>());
        self.calls += 1;
        if self.fail_after_warmup && self.calls > 1 {
            return Err(DetectorError::Inference {
                detector: "canned".to_string(),
                reason: "synthetic backend failure".to_string(),
            });
        }
        Ok(self.rows.clone())
    }
}

pub struct CannedBackendLoader {
    labels: Vec<String>,
    rows: Vec<Vec<f32>>,
    fail_after_warmup: bool,
}

impl CannedBackendLoader {
    pub fn new(labels: Vec<String>, rows: Vec<Vec<f32>>) -> Self {
        Self {
            labels,
            rows,
            fail_after_warmup: false,
        }
    }

    /// One confident person detection centered in the frame.
    pub fn single_person() -> Self {
        Self::new(
            vec!["person".to_string(), "cup".to_string()],
            vec![vec![0.5, 0.5, 0.2, 0.2, 0.95, 0.9, 0.05]],
        )
    }

    /// Loads fine (warm-up included) but every later inference fails.
    pub fn failing_after_warmup() -> Self {
        Self {
            labels: vec!["person".to_string()],
            rows: Vec::new(),
            fail_after_warmup: true,
        }
    }
}

#[async_trait]
impl BackendLoader for CannedBackendLoader {
    async fn load(&self, _source_ref: &str) -> Result<Box<dyn DetectorBackend>, DetectorError> {
        Ok(Box::new(CannedBackend {
            labels: self.labels.clone(),
            rows: self.rows.clone(),
            fail_after_warmup: self.fail_after_warmup,
            calls: 0,
        }))
    }
}

pub struct FailingLoader;

#[async_trait]
impl BackendLoader for FailingLoader {
    async fn load(&self, source_ref: &str) -> Result<Box<dyn DetectorBackend>, DetectorError> {
        Err(DetectorError::LoadFailed {
            source_ref: source_ref.to_string(),
            reason: "no such model".to_string(),
        })
    }
}
