use crate::bus::{Handedness, PerceptEvent, PerceptEventBus, PerceptKind, PerceptPayload};
use crate::config::PerceptionConfig;
use crate::detector::{
    BackendLoader, DetectionEnvelope, DetectorHandle, DetectorResponse, DetectorWorker,
};
use crate::error::PerceptError;
use crate::scheduler::{FrameScheduler, SchedulerHandle};
use crate::types::CameraFrame;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Wires the perception core together: one detector worker per modality, a
/// budget-bounded scheduler deciding which modality runs each frame tick,
/// and the event bus normalizing worker output into percepts.
///
/// The capture layer calls [`submit_frame`](PerceptionEngine::submit_frame)
/// at whatever rate it produces frames; under budget pressure some frames
/// are simply never processed. Consumers subscribe on the bus and, when they
/// need per-identity exclusivity, wrap their reactions in an
/// [`ExecutionSerializer`](crate::exclusive::ExecutionSerializer) keyed by
/// their own name.
pub struct PerceptionEngine {
    scheduler: SchedulerHandle,
    detectors: HashMap<String, DetectorHandle>,
    bus: Arc<Mutex<PerceptEventBus>>,
    latest_frame: Arc<Mutex<Option<CameraFrame>>>,
    cancel: CancellationToken,
}

impl PerceptionEngine {
    pub fn builder(config: PerceptionConfig) -> PerceptionEngineBuilder {
        PerceptionEngineBuilder {
            config,
            modalities: Vec::new(),
        }
    }

    /// Shared handle to the event bus, for subscribing. Handlers run inline
    /// during dispatch while the bus lock is held, so they must stay quick
    /// and must not call back into the bus.
    pub fn bus(&self) -> Arc<Mutex<PerceptEventBus>> {
        self.bus.clone()
    }

    pub fn detector(&self, modality: &str) -> Option<&DetectorHandle> {
        self.detectors.get(modality)
    }

    pub async fn load_backend(
        &self,
        modality: &str,
        source_ref: &str,
    ) -> Result<(), PerceptError> {
        let handle = self
            .detectors
            .get(modality)
            .ok_or_else(|| PerceptError::Config(format!("unknown modality {modality}")))?;
        handle.load_backend(source_ref).await?;
        Ok(())
    }

    /// Hand a frame to the scheduler. Stores it as the current frame and
    /// requests one detection task per modality; whether those run this
    /// step is the scheduler's call.
    pub fn submit_frame(&self, frame: CameraFrame) {
        *self.latest_frame.lock().unwrap() = Some(frame);
        for modality in self.detectors.keys() {
            self.scheduler.request(modality.clone(), 0);
        }
    }

    pub fn start(&self) {
        self.scheduler.start();
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Stop the driver and pumps. In-flight detector invocations are not
    /// cancelled; workers finish what they hold and exit once their request
    /// channels close.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PerceptionEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ModalityBinding {
    name: String,
    kind: PerceptKind,
    loader: Arc<dyn BackendLoader>,
    estimated_cost_ms: f64,
}

pub struct PerceptionEngineBuilder {
    config: PerceptionConfig,
    modalities: Vec<ModalityBinding>,
}

impl PerceptionEngineBuilder {
    pub fn with_detector(
        mut self,
        name: impl Into<String>,
        kind: PerceptKind,
        loader: Arc<dyn BackendLoader>,
        estimated_cost_ms: f64,
    ) -> Self {
        self.modalities.push(ModalityBinding {
            name: name.into(),
            kind,
            loader,
            estimated_cost_ms,
        });
        self
    }

    pub fn build(self) -> Result<PerceptionEngine, PerceptError> {
        self.config.validate()?;
        if self.modalities.is_empty() {
            return Err(PerceptError::Config(
                "at least one detector modality is required".to_string(),
            ));
        }

        let bus = Arc::new(Mutex::new(PerceptEventBus::new(self.config.bus.clone())));
        let latest_frame: Arc<Mutex<Option<CameraFrame>>> = Arc::new(Mutex::new(None));
        let mut scheduler = FrameScheduler::new(self.config.scheduler.clone());
        let cancel = CancellationToken::new();
        let mut detectors = HashMap::new();

        for binding in self.modalities {
            let (handle, mut responses) = DetectorWorker::spawn(
                binding.name.clone(),
                binding.loader,
                self.config.detector.clone(),
            );

            let frame_slot = latest_frame.clone();
            let worker = handle.clone();
            scheduler.register(
                binding.name.clone(),
                binding.estimated_cost_ms,
                Box::new(move || {
                    let frame = frame_slot.lock().unwrap().clone();
                    if let Some(frame) = frame {
                        if let Err(e) = worker.try_process_frame(frame) {
                            warn!("frame submission failed: {}", e);
                        }
                    }
                }),
            );

            let pump_bus = bus.clone();
            let pump_cancel = cancel.clone();
            let kind = binding.kind;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = pump_cancel.cancelled() => break,
                        response = responses.recv() => {
                            let Some(response) = response else { break };
                            handle_response(kind, response, &pump_bus);
                        }
                    }
                }
            });

            detectors.insert(binding.name, handle);
        }

        let scheduler_handle = scheduler.handle();
        tokio::spawn(scheduler.run(cancel.clone()));

        info!(modalities = detectors.len(), "perception engine started");
        Ok(PerceptionEngine {
            scheduler: scheduler_handle,
            detectors,
            bus,
            latest_frame,
            cancel,
        })
    }
}

fn handle_response(kind: PerceptKind, response: DetectorResponse, bus: &Mutex<PerceptEventBus>) {
    match response {
        DetectorResponse::BackendLoaded { success: true, .. } => {
            info!(%kind, "detector backend ready");
        }
        DetectorResponse::BackendLoaded { success: false, error } => {
            error!(%kind, "backend load failed: {}", error.unwrap_or_default());
        }
        DetectorResponse::Error { detector, message } => {
            error!(detector = %detector, "detection failed: {}", message);
        }
        DetectorResponse::Detections(envelope) => {
            let mut bus = bus.lock().unwrap();
            for event in envelope_to_events(kind, envelope) {
                bus.emit(event);
            }
        }
    }
}

/// Normalize a worker envelope into percept events for its modality.
pub fn envelope_to_events(kind: PerceptKind, envelope: DetectionEnvelope) -> Vec<PerceptEvent> {
    let timestamp_ms = envelope.timestamp_ms;
    match kind {
        PerceptKind::Object => {
            if envelope.batch.is_empty() {
                return Vec::new();
            }
            let confidence = envelope.confidence;
            vec![PerceptEvent::at(
                PerceptPayload::Object {
                    batch: envelope.batch,
                },
                confidence,
                timestamp_ms,
            )]
        }
        PerceptKind::Face => envelope
            .batch
            .detections()
            .iter()
            .map(|d| {
                PerceptEvent::at(
                    PerceptPayload::Face {
                        entity_id: d.label.clone(),
                        bbox: d.bbox,
                    },
                    d.confidence,
                    timestamp_ms,
                )
            })
            .collect(),
        PerceptKind::Gesture => envelope
            .batch
            .detections()
            .iter()
            .map(|d| {
                PerceptEvent::at(
                    PerceptPayload::Gesture {
                        name: d.label.clone(),
                        handedness: handedness_from_label(&d.label),
                    },
                    d.confidence,
                    timestamp_ms,
                )
            })
            .collect(),
        PerceptKind::Pose => envelope
            .batch
            .detections()
            .iter()
            .map(|d| {
                PerceptEvent::at(
                    PerceptPayload::Pose {
                        posture: d.label.clone(),
                        keypoints: Vec::new(),
                    },
                    d.confidence,
                    timestamp_ms,
                )
            })
            .collect(),
        PerceptKind::Emotion => envelope
            .batch
            .detections()
            .iter()
            .map(|d| {
                PerceptEvent::at(
                    PerceptPayload::Emotion {
                        emotion: d.label.clone(),
                        intensity: d.confidence,
                    },
                    d.confidence,
                    timestamp_ms,
                )
            })
            .collect(),
        // Loss is derived by the bus, never produced by a worker.
        PerceptKind::FaceLost => Vec::new(),
    }
}

fn handedness_from_label(label: &str) -> Handedness {
    let lower = label.to_ascii_lowercase();
    if lower.starts_with("left") {
        Handedness::Left
    } else if lower.starts_with("right") {
        Handedness::Right
    } else {
        Handedness::Unknown
    }
}
