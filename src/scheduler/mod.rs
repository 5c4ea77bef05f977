mod frame_scheduler;
mod task;

pub use frame_scheduler::{FrameScheduler, ProviderBinding, SchedulerHandle, StepReport, TaskHandler};
pub use task::ScheduledTask;
