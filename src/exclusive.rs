use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::trace;

struct LockEntry {
    mutex: Arc<AsyncMutex<()>>,
    waiters: usize,
}

/// Keyed mutual exclusion for event reactions.
///
/// `run_exclusive` guarantees that work submitted under the same key never
/// overlaps: waiters queue FIFO behind a fair async mutex created lazily per
/// key. Different keys never contend. The lock releases on every exit path
/// (value, error, cancellation, panic unwind) before the result reaches the
/// caller, so one failed reaction never poisons the key. Entries are
/// reference counted and removed once the last waiter is done.
#[derive(Clone, Default)]
pub struct ExecutionSerializer {
    locks: Arc<Mutex<HashMap<String, LockEntry>>>,
}

impl ExecutionSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` exclusively for `key`. The closure is invoked only once
    /// the key's lock is held, so side effects start in submission order.
    pub async fn run_exclusive<F, Fut, T>(&self, key: &str, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mutex = {
            let mut locks = self.locks.lock().unwrap();
            let entry = locks.entry(key.to_string()).or_insert_with(|| LockEntry {
                mutex: Arc::new(AsyncMutex::new(())),
                waiters: 0,
            });
            entry.waiters += 1;
            entry.mutex.clone()
        };
        let _cleanup = WaiterGuard {
            locks: self.locks.clone(),
            key: key.to_string(),
        };

        let _guard = mutex.lock().await;
        trace!(key, "exclusive section entered");
        task().await
    }

    /// Number of keys with live lock entries.
    pub fn active_keys(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

struct WaiterGuard {
    locks: Arc<Mutex<HashMap<String, LockEntry>>>,
    key: String,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        if let Ok(mut locks) = self.locks.lock() {
            if let Some(entry) = locks.get_mut(&self.key) {
                entry.waiters -= 1;
                if entry.waiters == 0 {
                    locks.remove(&self.key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Start(char),
        End(char),
    }

    fn recorder() -> (Arc<Mutex<Vec<Step>>>, impl Fn(Step) + Clone) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (log, move |step| sink.lock().unwrap().push(step))
    }

    #[tokio::test]
    async fn same_key_never_overlaps() {
        let serializer = ExecutionSerializer::new();
        let (log, record) = recorder();

        let first = {
            let serializer = serializer.clone();
            let record = record.clone();
            tokio::spawn(async move {
                serializer
                    .run_exclusive("agent-a", || async {
                        record(Step::Start('a'));
                        sleep(Duration::from_millis(50)).await;
                        record(Step::End('a'));
                    })
                    .await;
            })
        };
        // Give the first call time to take the lock.
        sleep(Duration::from_millis(5)).await;
        let second = {
            let serializer = serializer.clone();
            let record = record.clone();
            tokio::spawn(async move {
                serializer
                    .run_exclusive("agent-a", || async {
                        record(Step::Start('b'));
                        record(Step::End('b'));
                    })
                    .await;
            })
        };

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![Step::Start('a'), Step::End('a'), Step::Start('b'), Step::End('b')]
        );
        assert_eq!(serializer.active_keys(), 0);
    }

    #[tokio::test]
    async fn different_keys_interleave() {
        let serializer = ExecutionSerializer::new();
        let (log, record) = recorder();

        let slow = {
            let serializer = serializer.clone();
            let record = record.clone();
            tokio::spawn(async move {
                serializer
                    .run_exclusive("slow", || async {
                        record(Step::Start('s'));
                        sleep(Duration::from_millis(80)).await;
                        record(Step::End('s'));
                    })
                    .await;
            })
        };
        sleep(Duration::from_millis(5)).await;
        let fast = {
            let serializer = serializer.clone();
            let record = record.clone();
            tokio::spawn(async move {
                serializer
                    .run_exclusive("fast", || async {
                        record(Step::Start('f'));
                        record(Step::End('f'));
                    })
                    .await;
            })
        };

        slow.await.unwrap();
        fast.await.unwrap();
        // The fast key finished while the slow key was still inside.
        assert_eq!(
            *log.lock().unwrap(),
            vec![Step::Start('s'), Step::Start('f'), Step::End('f'), Step::End('s')]
        );
    }

    #[tokio::test]
    async fn errors_propagate_after_release() {
        let serializer = ExecutionSerializer::new();

        let failed: Result<(), String> = serializer
            .run_exclusive("agent-a", || async { Err("reaction failed".to_string()) })
            .await;
        assert!(failed.is_err());

        // The key is not poisoned; the next call runs normally.
        let ok: Result<u32, String> = serializer
            .run_exclusive("agent-a", || async { Ok(7) })
            .await;
        assert_eq!(ok, Ok(7));
        assert_eq!(serializer.active_keys(), 0);
    }

    #[tokio::test]
    async fn caller_side_timeout_releases_the_key() {
        let serializer = ExecutionSerializer::new();

        // Timeouts are an opt-in race at the call site, not built into the
        // serializer.
        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            serializer.run_exclusive("agent-a", || async {
                sleep(Duration::from_secs(5)).await;
            }),
        )
        .await;
        assert!(timed_out.is_err());

        // Cancellation released the lock; a fresh call proceeds.
        let value = serializer.run_exclusive("agent-a", || async { 42 }).await;
        assert_eq!(value, 42);
        assert_eq!(serializer.active_keys(), 0);
    }
}
