mod event;
mod event_bus;

pub use event::{Handedness, Keypoint, PerceptEvent, PerceptKind, PerceptPayload};
pub use event_bus::{EventHandler, PerceptEventBus, SubscriptionId, Topic};
