use super::worker::DetectorHandle;
use crate::error::DetectorError;
use crate::types::CameraFrame;
use futures::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::Service;

/// `tower` front for a detector worker.
///
/// Submits the frame to the worker and resolves with the frame once it has
/// been accepted; detection results come back on the worker's response
/// channel. Compose with `tower`'s timeout/limit layers for opt-in deadline
/// or concurrency control at the call site.
#[derive(Clone)]
pub struct DetectorService {
    handle: DetectorHandle,
}

impl DetectorService {
    pub fn new(handle: DetectorHandle) -> Self {
        Self { handle }
    }
}

impl Service<CameraFrame> for DetectorService {
    type Response = CameraFrame;
    type Error = DetectorError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, frame: CameraFrame) -> Self::Future {
        let handle = self.handle.clone();
        Box::pin(async move {
            handle.process_frame(frame.clone()).await?;
            Ok(frame)
        })
    }
}
