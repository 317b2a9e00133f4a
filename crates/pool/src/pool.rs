use crate::diagnostics::{DiagnosticsHandle, Event};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Queue slots on top of the workers when nothing else is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Sizing of a [`TaskPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers, i.e. the maximum number of tasks running at once.
    pub workers: usize,
    /// Number of accepted tasks allowed to wait for a free worker. Anything
    /// beyond `workers + queue_capacity` outstanding tasks is rejected.
    pub queue_capacity: usize,
}

impl PoolConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    fn admission_permits(&self) -> usize {
        self.workers.saturating_add(self.queue_capacity).min(Semaphore::MAX_PERMITS)
    }
}

/// Point-in-time view of a pool's counters.
///
/// Best effort only: by the time it's logged the numbers may have moved on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Fixed at construction.
    pub workers: usize,
    /// Accepted tasks that have not finished yet (queued plus running).
    pub queue_depth: usize,
    /// Tasks finished since construction, whether they succeeded or not.
    pub completed: u64,
}

struct Job {
    label: String,
    task: BoxFuture<'static, ()>,
    // Held until the task has finished so admission counts running tasks too.
    permit: OwnedSemaphorePermit,
}

struct Shared {
    diagnostics: DiagnosticsHandle,
    outstanding: AtomicUsize,
    completed: AtomicU64,
    live_workers: AtomicUsize,
    idle: Notify,
    terminated: Notify,
}

impl Shared {
    async fn run(&self, job: Job) {
        let Job { label, task, permit } = job;
        if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
            self.diagnostics.record(Event::TaskPanicked {
                item: label,
                message: panic_message(panic.as_ref()),
            });
        }
        drop(permit);
        self.completed.fetch_add(1, Ordering::AcqRel);
        self.finish_one();
    }

    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// A fixed number of workers executing submitted futures, with bounded
/// admission and a deterministic shutdown protocol.
///
/// Tasks are labelled (usually with the key of the item they process) so that
/// rejections and panics can be reported against an item. A task that panics
/// is caught by its worker and reported through the pool's diagnostics; it
/// never takes down the worker, the pool, or any other task.
///
/// The pool shuts itself down when dropped, so however the enclosing
/// operation exits, [`shutdown()`](Self::shutdown) has happened exactly once.
///
/// # Examples
///
/// ```
/// use bucketfan_pool::{PoolConfig, TaskPool, TracingDiagnostics};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = TaskPool::new(PoolConfig::new(4), TracingDiagnostics::handle())?;
/// let seen = Arc::new(AtomicUsize::new(0));
/// for n in 0..10 {
///     let seen = seen.clone();
///     pool.submit(format!("task-{n}"), async move {
///         seen.fetch_add(1, Ordering::Relaxed);
///     })?;
/// }
/// pool.drain().await;
/// assert_eq!(seen.load(Ordering::Relaxed), 10);
/// # Ok(())
/// # }
/// ```
pub struct TaskPool {
    workers: usize,
    admission: Arc<Semaphore>,
    sender: Mutex<Option<UnboundedSender<Job>>>,
    shared: Arc<Shared>,
}

impl TaskPool {
    /// Spawn `config.workers` workers on the current Tokio runtime.
    ///
    /// # Errors
    /// [`InvalidWorkerCount`](ErrorKind::InvalidWorkerCount) for zero workers,
    /// [`NoRuntime`](ErrorKind::NoRuntime) outside of a Tokio runtime.
    pub fn new(config: PoolConfig, diagnostics: DiagnosticsHandle) -> Result<Self> {
        if config.workers == 0 {
            exn::bail!(ErrorKind::InvalidWorkerCount(config.workers));
        }
        let runtime = Handle::try_current().or_raise(|| ErrorKind::NoRuntime)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let shared = Arc::new(Shared {
            diagnostics,
            outstanding: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            live_workers: AtomicUsize::new(config.workers),
            idle: Notify::new(),
            terminated: Notify::new(),
        });
        for _ in 0..config.workers {
            // Detached: termination is tracked through `live_workers`.
            runtime.spawn(work(receiver.clone(), shared.clone()));
        }
        Ok(Self {
            workers: config.workers,
            admission: Arc::new(Semaphore::new(config.admission_permits())),
            sender: Mutex::new(Some(sender)),
            shared,
        })
    }

    /// Hand a task to the pool.
    ///
    /// # Errors
    /// A rejection, carrying `label`: [`Saturated`](ErrorKind::Saturated) when
    /// the pool has no room left, [`Closed`](ErrorKind::Closed) after
    /// [`shutdown()`](Self::shutdown). The task is dropped without running.
    pub fn submit<F>(&self, label: impl Into<String>, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        let permit = match self.admission.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => exn::bail!(ErrorKind::Saturated(label)),
            Err(TryAcquireError::Closed) => exn::bail!(ErrorKind::Closed(label)),
        };
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            exn::bail!(ErrorKind::Closed(label));
        };
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        let job = Job {
            label,
            task: task.boxed(),
            permit,
        };
        if let Err(mpsc::error::SendError(job)) = sender.send(job) {
            // Every worker is gone, which only happens if the runtime is
            // shutting down underneath us.
            self.shared.finish_one();
            exn::bail!(ErrorKind::Closed(job.label));
        }
        Ok(())
    }

    /// Stop accepting tasks. Tasks already accepted still run to completion.
    ///
    /// Idempotent: returns `true` (and reports the shutdown) only for the
    /// call that actually closed the pool.
    pub fn shutdown(&self) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        if sender.is_none() {
            return false;
        }
        self.admission.close();
        // Dropping the only sender lets workers exit once the queue is empty.
        drop(sender);
        self.shared.diagnostics.record(Event::PoolShutdown { status: self.status() });
        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Wait until every worker has exited. Only returns after
    /// [`shutdown()`](Self::shutdown) has been called.
    pub async fn await_termination(&self) {
        wait_for(&self.shared.terminated, || self.shared.live_workers.load(Ordering::Acquire) == 0).await;
    }

    /// [`shutdown()`](Self::shutdown) followed by
    /// [`await_termination()`](Self::await_termination).
    pub async fn drain(&self) {
        self.shutdown();
        self.await_termination().await;
    }

    /// Wait until every task accepted so far has finished, leaving the pool
    /// open for more.
    pub async fn wait_idle(&self) {
        wait_for(&self.shared.idle, || self.shared.outstanding.load(Ordering::Acquire) == 0).await;
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            workers: self.workers,
            queue_depth: self.shared.outstanding.load(Ordering::Acquire),
            completed: self.shared.completed.load(Ordering::Acquire),
        }
    }

    /// Report the current [`status()`](Self::status) to diagnostics.
    pub fn report_status(&self, context: impl Into<String>) {
        self.shared.diagnostics.record(Event::PoolStatus {
            context: context.into(),
            status: self.status(),
        });
    }

    pub fn diagnostics(&self) -> &DiagnosticsHandle {
        &self.shared.diagnostics
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("status", &self.status())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

async fn work(receiver: Arc<AsyncMutex<UnboundedReceiver<Job>>>, shared: Arc<Shared>) {
    loop {
        // Only one idle worker waits on the channel; the rest wait on the lock.
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else { break };
        shared.run(job).await;
    }
    if shared.live_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
        shared.terminated.notify_waiters();
    }
}

async fn wait_for(notify: &Notify, done: impl Fn() -> bool) {
    loop {
        let mut notified = std::pin::pin!(notify.notified());
        // Register before checking, or a notification between the check and
        // the await would be lost.
        notified.as_mut().enable();
        if done() {
            return;
        }
        notified.await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use std::time::Duration;

    fn pool(workers: usize, queue_capacity: usize) -> (TaskPool, Arc<RecordingDiagnostics>) {
        let diagnostics = RecordingDiagnostics::new();
        let config = PoolConfig::new(workers).with_queue_capacity(queue_capacity);
        let pool = TaskPool::new(config, diagnostics.clone()).unwrap();
        (pool, diagnostics)
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let err = TaskPool::new(PoolConfig::new(0), RecordingDiagnostics::new()).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidWorkerCount(0));
    }

    #[test]
    fn test_requires_runtime() {
        let err = TaskPool::new(PoolConfig::new(2), RecordingDiagnostics::new()).unwrap_err();
        assert_eq!(*err, ErrorKind::NoRuntime);
    }

    #[tokio::test]
    async fn test_initial_status() {
        let (pool, _) = pool(3, 5);
        assert_eq!(
            pool.status(),
            PoolStatus {
                workers: 3,
                queue_depth: 0,
                completed: 0
            }
        );
        assert!(!pool.is_shutdown());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_runs_every_accepted_task() {
        let (pool, _) = pool(8, 1_000);
        let seen = Arc::new(AtomicUsize::new(0));
        for n in 0..200 {
            let seen = seen.clone();
            pool.submit(format!("task-{n}"), async move {
                seen.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        pool.drain().await;
        assert_eq!(seen.load(Ordering::Relaxed), 200);
        let status = pool.status();
        assert_eq!(status.completed, 200);
        assert_eq!(status.queue_depth, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_workers() {
        let (pool, _) = pool(3, 100);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for n in 0..24 {
            let running = running.clone();
            let peak = peak.clone();
            pool.submit(n.to_string(), async move {
                let now = running.fetch_add(1, Ordering::AcqRel) + 1;
                peak.fetch_max(now, Ordering::AcqRel);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::AcqRel);
            })
            .unwrap();
        }
        pool.drain().await;
        assert!(peak.load(Ordering::Acquire) <= 3);
        assert!(peak.load(Ordering::Acquire) >= 1);
    }

    async fn explode() {
        panic!("kaboom");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panic_is_isolated() {
        let (pool, diagnostics) = pool(2, 10);
        let seen = Arc::new(AtomicUsize::new(0));
        pool.submit("boom", explode()).unwrap();
        for n in 0..5 {
            let seen = seen.clone();
            pool.submit(n.to_string(), async move {
                seen.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        pool.wait_idle().await;
        // The pool is still usable after a task panicked.
        let after = seen.clone();
        pool.submit("after", async move {
            after.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        pool.drain().await;
        assert_eq!(seen.load(Ordering::Relaxed), 6);
        assert_eq!(pool.status().completed, 7);
        let panics: Vec<_> = diagnostics
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::TaskPanicked { item, message } => Some((item, message)),
                _ => None,
            })
            .collect();
        assert_eq!(panics, vec![("boom".to_string(), "kaboom".to_string())]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_saturation_rejects_with_label() {
        // One worker plus one queue slot: nothing runs until we yield, so the
        // third submission finds the pool full.
        let (pool, _) = pool(1, 1);
        pool.submit("a", async {}).unwrap();
        pool.submit("b", async {}).unwrap();
        let err = pool.submit("c", async {}).unwrap_err();
        assert_eq!(*err, ErrorKind::Saturated("c".to_string()));
        assert_eq!(pool.status().queue_depth, 2);
        pool.wait_idle().await;
        // Room again once the backlog has been worked off.
        pool.submit("d", async {}).unwrap();
        pool.drain().await;
        assert_eq!(pool.status().completed, 3);
    }

    #[tokio::test]
    async fn test_closed_after_shutdown() {
        let (pool, diagnostics) = pool(2, 2);
        assert!(pool.shutdown());
        assert!(!pool.shutdown());
        assert!(pool.is_shutdown());
        let err = pool.submit("late", async {}).unwrap_err();
        assert_eq!(*err, ErrorKind::Closed("late".to_string()));
        pool.await_termination().await;
        drop(pool);
        assert_eq!(diagnostics.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_accepted_tasks_finish_after_shutdown() {
        let (pool, _) = pool(1, 10);
        let seen = Arc::new(AtomicUsize::new(0));
        for n in 0..5 {
            let seen = seen.clone();
            pool.submit(n.to_string(), async move {
                tokio::task::yield_now().await;
                seen.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        pool.shutdown();
        pool.await_termination().await;
        assert_eq!(seen.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn test_wait_idle_between_cycles() {
        let (pool, diagnostics) = pool(2, 10);
        let seen = Arc::new(AtomicUsize::new(0));
        for cycle in 1..=3 {
            for n in 0..4 {
                let seen = seen.clone();
                pool.submit(format!("{cycle}-{n}"), async move {
                    seen.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
            }
            pool.wait_idle().await;
            assert_eq!(seen.load(Ordering::Relaxed), cycle * 4);
            assert_eq!(pool.status().queue_depth, 0);
        }
        assert_eq!(diagnostics.shutdowns(), 0);
        pool.drain().await;
        assert_eq!(diagnostics.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_wait_idle_on_fresh_pool_returns() {
        let (pool, _) = pool(1, 0);
        pool.wait_idle().await;
    }

    #[tokio::test]
    async fn test_drop_shuts_down_once() {
        let (pool, diagnostics) = pool(2, 2);
        drop(pool);
        assert_eq!(diagnostics.shutdowns(), 1);

        let (pool, diagnostics) = pool_with_drain().await;
        drop(pool);
        assert_eq!(diagnostics.shutdowns(), 1);
    }

    async fn pool_with_drain() -> (TaskPool, Arc<RecordingDiagnostics>) {
        let (pool, diagnostics) = pool(2, 2);
        pool.drain().await;
        (pool, diagnostics)
    }

    #[tokio::test]
    async fn test_report_status() {
        let (pool, diagnostics) = pool(4, 0);
        pool.report_status("Initialized");
        assert_eq!(
            diagnostics.events(),
            vec![Event::PoolStatus {
                context: "Initialized".to_string(),
                status: PoolStatus {
                    workers: 4,
                    queue_depth: 0,
                    completed: 0
                }
            }]
        );
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
