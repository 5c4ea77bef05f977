use super::event::{PerceptEvent, PerceptKind, PerceptPayload};
use crate::config::BusConfig;
use crate::error::BusError;
use std::collections::HashMap;
use tracing::{debug, trace};

pub type EventHandler = Box<dyn FnMut(&PerceptEvent) + Send>;

/// What a subscriber listens to: one kind, or everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Kind(PerceptKind),
    Any,
}

impl Topic {
    fn matches(&self, kind: PerceptKind) -> bool {
        match self {
            Topic::Kind(k) => *k == kind,
            Topic::Any => true,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::Kind(k) => write!(f, "{k}"),
            Topic::Any => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    topic: Topic,
    handler: EventHandler,
}

/// Typed publish/subscribe channel for percepts.
///
/// `emit` applies, in order: the per-kind confidence floor, the per-kind
/// throttle window (entity transitions bypass it), entity tracking with
/// derived lost events, then synchronous dispatch to matching subscribers in
/// registration order. Handlers run inline; anything slow belongs on a task
/// the handler spawns, the bus never awaits a subscriber.
///
/// The event's own timestamp is the clock. Detection flows stamp events at
/// capture time, so throttling follows the frame timeline rather than
/// whenever a worker got around to responding.
pub struct PerceptEventBus {
    subscribers: Vec<Subscriber>,
    last_accepted: HashMap<PerceptKind, i64>,
    tracked: HashMap<String, i64>,
    config: BusConfig,
    next_id: u64,
}

impl PerceptEventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            subscribers: Vec::new(),
            last_accepted: HashMap::new(),
            tracked: HashMap::new(),
            config,
            next_id: 0,
        }
    }

    pub fn on(&mut self, topic: Topic, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber { id, topic, handler });
        id
    }

    pub fn off(&mut self, topic: Topic, id: SubscriptionId) -> Result<(), BusError> {
        let before = self.subscribers.len();
        self.subscribers
            .retain(|s| !(s.id == id && s.topic == topic));
        if self.subscribers.len() == before {
            return Err(BusError::UnknownSubscription {
                id: id.0,
                topic: topic.to_string(),
            });
        }
        Ok(())
    }

    /// Emit an event. Returns whether it reached subscribers.
    pub fn emit(&mut self, event: PerceptEvent) -> bool {
        let now = event.timestamp_ms;
        self.sweep_lost(now);

        let kind = event.kind();
        if let Some(floor) = self.config.confidence_floors.floor(kind) {
            if event.confidence < floor {
                trace!(%kind, "confidence {} below floor {}", event.confidence, floor);
                return false;
            }
        }

        // First sighting and loss always get through; steady-state repeats
        // of the same kind are rate limited.
        let is_transition = kind == PerceptKind::FaceLost
            || event
                .payload
                .entity_id()
                .is_some_and(|id| !self.tracked.contains_key(id));

        if !is_transition {
            if let Some(&last) = self.last_accepted.get(&kind) {
                if now - last < self.config.throttle.window(kind) {
                    trace!(%kind, "throttled");
                    return false;
                }
            }
        }

        match (&event.payload, event.payload.entity_id()) {
            (PerceptPayload::FaceLost { .. }, Some(id)) => {
                self.tracked.remove(id);
            }
            (_, Some(id)) => {
                self.tracked.insert(id.to_string(), now);
            }
            _ => {}
        }

        self.last_accepted.insert(kind, now);
        self.dispatch(&event);
        true
    }

    /// Scan for entities unseen past the grace period and synthesize a lost
    /// event for each. Runs on every emit; also callable directly with an
    /// explicit clock for deterministic sweeps.
    pub fn sweep_lost(&mut self, now_ms: i64) -> usize {
        let grace = self.config.lost_grace_ms;
        let expired: Vec<String> = self
            .tracked
            .iter()
            .filter(|(_, &last_seen)| now_ms - last_seen > grace)
            .map(|(id, _)| id.clone())
            .collect();

        for entity_id in &expired {
            self.tracked.remove(entity_id);
            debug!(entity_id, "entity lost");
            let lost = PerceptEvent::at(
                PerceptPayload::FaceLost {
                    entity_id: entity_id.clone(),
                },
                1.0,
                now_ms,
            );
            self.last_accepted.insert(PerceptKind::FaceLost, now_ms);
            self.dispatch(&lost);
        }
        expired.len()
    }

    pub fn tracked_entities(&self) -> usize {
        self.tracked.len()
    }

    fn dispatch(&mut self, event: &PerceptEvent) {
        let kind = event.kind();
        for subscriber in &mut self.subscribers {
            if subscriber.topic.matches(kind) {
                (subscriber.handler)(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::types::{Detection, DetectionBatch};
    use std::sync::{Arc, Mutex};

    fn object_event(confidence: f32, timestamp_ms: i64) -> PerceptEvent {
        let batch = DetectionBatch::new(vec![Detection {
            label: "cup".to_string(),
            confidence,
            bbox: BoundingBox::new(0.1, 0.1, 0.3, 0.3),
        }]);
        PerceptEvent::at(PerceptPayload::Object { batch }, confidence, timestamp_ms)
    }

    fn face_event(entity: &str, timestamp_ms: i64) -> PerceptEvent {
        PerceptEvent::at(
            PerceptPayload::Face {
                entity_id: entity.to_string(),
                bbox: BoundingBox::new(0.2, 0.2, 0.5, 0.5),
            },
            0.95,
            timestamp_ms,
        )
    }

    fn recording_bus() -> (PerceptEventBus, Arc<Mutex<Vec<PerceptKind>>>) {
        let mut bus = PerceptEventBus::new(BusConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.on(
            Topic::Any,
            Box::new(move |event| sink.lock().unwrap().push(event.kind())),
        );
        (bus, seen)
    }

    #[test]
    fn throttle_drops_rapid_repeats_of_a_kind() {
        let (mut bus, seen) = recording_bus();
        assert!(bus.emit(object_event(0.9, 0)));
        assert!(!bus.emit(object_event(0.9, 100)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn emissions_outside_the_window_both_deliver() {
        let (mut bus, seen) = recording_bus();
        assert!(bus.emit(object_event(0.9, 0)));
        assert!(bus.emit(object_event(0.9, 300)));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn confidence_floor_filters_object_events() {
        let (mut bus, seen) = recording_bus();
        assert!(!bus.emit(object_event(0.45, 0)));
        assert!(bus.emit(object_event(0.92, 10)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn first_sightings_bypass_the_throttle() {
        let (mut bus, seen) = recording_bus();
        assert!(bus.emit(face_event("alice", 0)));
        // Same kind 10ms later, but a new entity: transition, not throttled.
        assert!(bus.emit(face_event("bob", 10)));
        // A repeat of a tracked entity inside the window is throttled.
        assert!(!bus.emit(face_event("alice", 20)));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn lost_events_are_synthesized_after_the_grace_period() {
        let (mut bus, seen) = recording_bus();
        assert!(bus.emit(face_event("alice", 0)));
        assert_eq!(bus.tracked_entities(), 1);

        // Next emit past the grace period sweeps alice out first.
        assert!(bus.emit(object_event(0.9, 3_000)));
        let kinds = seen.lock().unwrap().clone();
        assert_eq!(
            kinds,
            vec![PerceptKind::Face, PerceptKind::FaceLost, PerceptKind::Object]
        );
        assert_eq!(bus.tracked_entities(), 0);

        // No duplicate loss on the next sweep.
        assert_eq!(bus.sweep_lost(10_000), 0);
    }

    #[test]
    fn exact_and_wildcard_subscribers_fire_in_registration_order() {
        let mut bus = PerceptEventBus::new(BusConfig::default());
        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, topic) in [
            ("wildcard", Topic::Any),
            ("object", Topic::Kind(PerceptKind::Object)),
            ("face", Topic::Kind(PerceptKind::Face)),
        ] {
            let order = order.clone();
            bus.on(topic, Box::new(move |_| order.lock().unwrap().push(label)));
        }

        bus.emit(object_event(0.9, 0));
        assert_eq!(*order.lock().unwrap(), vec!["wildcard", "object"]);
    }

    #[test]
    fn off_stops_delivery() {
        let mut bus = PerceptEventBus::new(BusConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = bus.on(
            Topic::Kind(PerceptKind::Object),
            Box::new(move |e| sink.lock().unwrap().push(e.kind())),
        );

        bus.emit(object_event(0.9, 0));
        bus.off(Topic::Kind(PerceptKind::Object), id).expect("off");
        bus.emit(object_event(0.9, 1_000));
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert!(bus.off(Topic::Kind(PerceptKind::Object), id).is_err());
    }
}
