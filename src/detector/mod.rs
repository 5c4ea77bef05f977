mod backend;
mod decode;
mod pipeline;
mod service;
#[cfg(test)]
pub(crate) mod testing;
mod worker;

pub use backend::{BackendLoader, DetectorBackend};
pub use decode::{decode_candidates, postprocess};
pub use pipeline::{preprocess, BackendState, DetectionPipeline};
pub use service::DetectorService;
pub use worker::{
    DetectionEnvelope, DetectorHandle, DetectorRequest, DetectorResponse, DetectorWorker,
};
