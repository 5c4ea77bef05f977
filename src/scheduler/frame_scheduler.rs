use super::task::ScheduledTask;
use crate::config::SchedulerConfig;
use indexmap::IndexMap;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub type TaskHandler = Box<dyn FnMut() + Send>;

/// Binds a task type to its handler and fixed cost estimate. Mutated only by
/// register/unregister, never by a scheduling step.
pub struct ProviderBinding {
    pub handler: TaskHandler,
    pub estimated_cost_ms: f64,
}

/// What one scheduling step did.
#[derive(Debug, Default, Clone)]
pub struct StepReport {
    pub dispatched: usize,
    /// Tasks with no bound provider.
    pub discarded: usize,
    /// Task type dropped because its cost exceeded the remaining budget.
    pub dropped: Option<String>,
    pub spent_ms: f64,
    pub overran: bool,
}

/// Cooperative, budget-bounded dispatcher.
///
/// Once per driver tick it pops pending tasks in priority order and invokes
/// their handlers until the per-step compute budget runs out. Handlers are
/// fire-and-forget: they must return control immediately and push real work
/// elsewhere (typically a detector worker channel). Requests are re-entrant;
/// a handler may enqueue more work mid-step through a [`SchedulerHandle`]
/// and the running step observes it.
pub struct FrameScheduler {
    bindings: IndexMap<String, ProviderBinding>,
    queue: BinaryHeap<ScheduledTask>,
    request_tx: mpsc::UnboundedSender<ScheduledTask>,
    request_rx: mpsc::UnboundedReceiver<ScheduledTask>,
    seq: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    config: SchedulerConfig,
}

impl FrameScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        Self {
            bindings: IndexMap::new(),
            queue: BinaryHeap::new(),
            request_tx,
            request_rx,
            seq: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Cloneable handle for requesting tasks and toggling the driver from
    /// other tasks or from inside handlers.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            request_tx: self.request_tx.clone(),
            seq: self.seq.clone(),
            running: self.running.clone(),
        }
    }

    /// Bind a task type. Re-registering a type overwrites the prior binding.
    pub fn register(
        &mut self,
        task_type: impl Into<String>,
        estimated_cost_ms: f64,
        handler: TaskHandler,
    ) {
        self.bindings.insert(
            task_type.into(),
            ProviderBinding {
                handler,
                estimated_cost_ms,
            },
        );
    }

    pub fn unregister(&mut self, task_type: &str) -> bool {
        self.bindings.shift_remove(task_type).is_some()
    }

    /// Enqueue a task. Never runs anything synchronously.
    pub fn request(&mut self, task_type: impl Into<String>, priority: i32) {
        let task = ScheduledTask {
            task_type: task_type.into(),
            priority,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        self.queue.push(task);
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn drain_requests(&mut self) {
        while let Ok(task) = self.request_rx.try_recv() {
            self.queue.push(task);
        }
    }

    /// One scheduling step.
    ///
    /// Pops the highest-priority task while budget remains: unbound types
    /// are discarded; a task whose cost exceeds the remaining budget is
    /// dropped (not requeued) and ends the step. The starvation risk for
    /// expensive task types under sustained load is a known policy point,
    /// surfaced through [`StepReport::dropped`].
    pub fn step(&mut self) -> StepReport {
        let mut report = StepReport::default();
        let mut budget = self.config.max_budget_ms;

        loop {
            // Requests made mid-step (including by handlers) are visible to
            // this same step.
            self.drain_requests();
            if budget <= 0.0 {
                break;
            }
            let Some(task) = self.queue.pop() else {
                break;
            };
            let Some(binding) = self.bindings.get_mut(&task.task_type) else {
                debug!(task_type = %task.task_type, "no provider bound, discarding task");
                report.discarded += 1;
                continue;
            };
            if binding.estimated_cost_ms > budget {
                warn!(
                    task_type = %task.task_type,
                    cost_ms = binding.estimated_cost_ms,
                    remaining_ms = budget,
                    "task cost exceeds remaining step budget, dropping"
                );
                report.dropped = Some(task.task_type);
                break;
            }
            budget -= binding.estimated_cost_ms;
            report.spent_ms += binding.estimated_cost_ms;
            (binding.handler)();
            report.dispatched += 1;
        }

        report.overran = budget <= 0.0;
        trace!(
            dispatched = report.dispatched,
            spent_ms = report.spent_ms,
            overran = report.overran,
            "scheduling step complete"
        );
        report
    }

    /// Drive scheduling steps at the frame interval until cancelled.
    ///
    /// Stands in for the host's frame callback. After an over-budget step
    /// the loop yields to the runtime once before the next tick so other
    /// tasks (rendering, I/O) get a turn.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.frame_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if !self.is_running() {
                        continue;
                    }
                    let report = self.step();
                    if report.overran {
                        tokio::task::yield_now().await;
                    }
                }
            }
        }
        debug!("frame scheduler driver stopped");
    }
}

/// Cheap-clone handle into a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    request_tx: mpsc::UnboundedSender<ScheduledTask>,
    seq: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub fn request(&self, task_type: impl Into<String>, priority: i32) {
        let task = ScheduledTask {
            task_type: task_type.into(),
            priority,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        if self.request_tx.send(task).is_err() {
            warn!("scheduler is gone, request ignored");
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn scheduler(budget_ms: f64) -> FrameScheduler {
        FrameScheduler::new(SchedulerConfig {
            max_budget_ms: budget_ms,
            frame_interval_ms: 5,
        })
    }

    fn counting_handler(counter: &Arc<AtomicUsize>) -> TaskHandler {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn budget_limits_dispatch_count() {
        let mut scheduler = scheduler(5.0);
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.register("detect", 2.0, counting_handler(&counter));

        scheduler.request("detect", 0);
        scheduler.request("detect", 0);
        scheduler.request("detect", 0);

        let report = scheduler.step();
        assert_eq!(report.dispatched, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(report.dropped.as_deref(), Some("detect"));
    }

    #[test]
    fn higher_priority_runs_first_and_ties_keep_insertion_order() {
        let mut scheduler = scheduler(10.0);
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "urgent", "second"] {
            let order = order.clone();
            scheduler.register(name, 1.0, Box::new(move || {
                order.lock().unwrap().push(name);
            }));
        }

        scheduler.request("first", 0);
        scheduler.request("urgent", 5);
        scheduler.request("second", 0);
        scheduler.step();

        assert_eq!(*order.lock().unwrap(), vec!["urgent", "first", "second"]);
    }

    #[test]
    fn unbound_task_types_are_discarded() {
        let mut scheduler = scheduler(5.0);
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.register("known", 1.0, counting_handler(&counter));

        scheduler.request("unknown", 9);
        scheduler.request("known", 0);

        let report = scheduler.step();
        assert_eq!(report.discarded, 1);
        assert_eq!(report.dispatched, 1);
    }

    #[test]
    fn reregistering_overwrites_the_cost_estimate() {
        let mut scheduler = scheduler(5.0);
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.register("detect", 50.0, counting_handler(&counter));
        scheduler.register("detect", 1.0, counting_handler(&counter));

        scheduler.request("detect", 0);
        let report = scheduler.step();
        assert_eq!(report.dispatched, 1);
        assert!(report.dropped.is_none());
    }

    #[test]
    fn reentrant_requests_are_visible_within_the_step() {
        let mut scheduler = scheduler(5.0);
        let handle = scheduler.handle();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler_counter = counter.clone();
        scheduler.register("detect", 2.0, Box::new(move || {
            handler_counter.fetch_add(1, Ordering::SeqCst);
            // Each run asks for another; the budget is what stops us.
            handle.request("detect", 0);
        }));

        scheduler.request("detect", 0);
        let report = scheduler.step();
        assert_eq!(report.dispatched, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unregister_removes_the_binding() {
        let mut scheduler = scheduler(5.0);
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.register("detect", 1.0, counting_handler(&counter));
        assert!(scheduler.unregister("detect"));

        scheduler.request("detect", 0);
        let report = scheduler.step();
        assert_eq!(report.discarded, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn driver_only_steps_while_started() {
        let scheduler = {
            let mut s = scheduler(5.0);
            let counter = Arc::new(AtomicUsize::new(0));
            s.register("detect", 1.0, counting_handler(&counter));
            s
        };
        let handle = scheduler.handle();
        let cancel = CancellationToken::new();
        let driver = tokio::spawn(scheduler.run(cancel.clone()));

        // Stopped: requests pile up without being dispatched. We only check
        // the driver stays alive and shuts down cleanly on cancel.
        handle.request("detect", 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop();

        cancel.cancel();
        driver.await.expect("driver task");
    }
}
