//! Supervision of fire-and-forget connection tasks.
//!
//! The accept loop never awaits the tasks it spawns. Instead each task's
//! [`JoinHandle`] is handed to a [`Supervisor`], whose single background
//! worker wakes up every [`REAP_INTERVAL`], looks at every tracked handle once,
//! and keeps only the ones still running. Failures are logged there and go no
//! further: a faulted task never affects its siblings, the accept loop or the
//! process.
//!
//! ## Reaping
//!
//! Registration pushes onto a lock-free queue and may happen from any thread
//! at any time. A reap cycle first moves everything currently queued into a
//! scratch buffer owned by the worker, then drains that buffer: running tasks
//! go back onto the live queue, finished ones are inspected and dropped.
//! Handles registered while a cycle is in progress land on the live queue and
//! are picked up by the next cycle.
//!
//! | Outcome                      | Observation | Logged         |
//! |------------------------------|-------------|----------------|
//! | returned `Ok(())`            | completed   | no             |
//! | returned `Err(_)`            | faulted     | `error!`       |
//! | panicked                     | faulted     | `error!`       |
//! | aborted                      | cancelled   | no             |

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use crossbeam::queue::SegQueue;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::server::ServerError;

/// Output of a supervised task.
pub type TaskResult = Result<(), ServerError>;

/// Default pause between two reap cycles.
pub const REAP_INTERVAL: Duration = Duration::from_millis(100);

/// Terminal-state counters, one increment per observed task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    pub completed: usize,
    pub faulted: usize,
    pub cancelled: usize,
}

impl SupervisorStats {
    /// Total number of tasks observed in a terminal state.
    pub fn total(&self) -> usize {
        self.completed + self.faulted + self.cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observation {
    Running,
    Completed,
    Faulted,
    Cancelled,
}

#[derive(Default)]
struct Counters {
    completed: AtomicUsize,
    faulted: AtomicUsize,
    cancelled: AtomicUsize,
}

// State shared between the supervisor handle and its worker.
#[derive(Default)]
struct Tracked {
    live: SegQueue<JoinHandle<TaskResult>>,
    counters: Counters,
}

impl Tracked {
    // Never blocks: a finished handle is polled once, outside the coop budget.
    fn observe(&self, handle: &mut JoinHandle<TaskResult>) -> Observation {
        if !handle.is_finished() {
            return Observation::Running;
        }

        let mut cx = Context::from_waker(Waker::noop());
        let outcome = match pin!(tokio::task::unconstrained(handle)).poll(&mut cx) {
            Poll::Ready(outcome) => outcome,
            Poll::Pending => return Observation::Running,
        };

        let observation = match outcome {
            Ok(Ok(())) => Observation::Completed,
            Ok(Err(e)) => {
                error!(error = %e, "connection task failed");
                Observation::Faulted
            }
            Err(e) if e.is_cancelled() => Observation::Cancelled,
            Err(e) => {
                error!(error = %e, "connection task panicked");
                Observation::Faulted
            }
        };

        let counter = match observation {
            Observation::Completed => &self.counters.completed,
            Observation::Faulted => &self.counters.faulted,
            Observation::Cancelled => &self.counters.cancelled,
            Observation::Running => return observation,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        observation
    }

    fn reap(&self, scratch: &mut Vec<JoinHandle<TaskResult>>) {
        while let Some(handle) = self.live.pop() {
            scratch.push(handle);
        }

        for mut handle in scratch.drain(..) {
            if self.observe(&mut handle) == Observation::Running {
                self.live.push(handle);
            }
        }
    }

    fn clear(&self) {
        while self.live.pop().is_some() {}
        self.counters.completed.store(0, Ordering::Relaxed);
        self.counters.faulted.store(0, Ordering::Relaxed);
        self.counters.cancelled.store(0, Ordering::Relaxed);
    }
}

struct Worker {
    task: JoinHandle<()>,
    token: CancellationToken,
}

impl Worker {
    async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "supervisor worker ended abnormally");
        }
    }
}

/// Tracks fire-and-forget tasks and reports how they end.
///
/// # Examples
///
/// ```rust,no_run
/// use rawhttp::supervisor::Supervisor;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let supervisor = Supervisor::new();
/// let shutdown = CancellationToken::new();
/// supervisor.start(&shutdown).await;
///
/// supervisor.spawn(async { Ok(()) });
///
/// supervisor.stop().await;
/// # }
/// ```
pub struct Supervisor {
    tracked: Arc<Tracked>,
    interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    /// Creates a stopped supervisor reaping every [`REAP_INTERVAL`].
    pub fn new() -> Self {
        Self::with_interval(REAP_INTERVAL)
    }

    /// Creates a stopped supervisor with a custom reap interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            tracked: Arc::new(Tracked::default()),
            interval,
            worker: Mutex::new(None),
        }
    }

    /// Starts the background worker, stopping a previous one first.
    ///
    /// Anything tracked before the call is forgotten (the tasks themselves
    /// keep running) and the counters are reset. The worker stops when
    /// `cancel` fires or [`Supervisor::stop`] is called.
    pub async fn start(&self, cancel: &CancellationToken) {
        let mut worker = self.worker.lock().await;
        if let Some(previous) = worker.take() {
            previous.shutdown().await;
        }
        self.tracked.clear();

        let token = cancel.child_token();
        let task = tokio::spawn(run_worker(
            Arc::clone(&self.tracked),
            self.interval,
            token.clone(),
        ));
        *worker = Some(Worker { task, token });
        debug!(interval = ?self.interval, "supervisor started");
    }

    /// Stops the background worker and waits for it to exit. No-op when not started.
    pub async fn stop(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            worker.shutdown().await;
            debug!("supervisor stopped");
        }
    }

    /// Hands a task over to the supervisor.
    ///
    /// A task that has already finished is inspected on the spot and not
    /// tracked.
    pub fn register(&self, mut handle: JoinHandle<TaskResult>) {
        if self.tracked.observe(&mut handle) == Observation::Running {
            self.tracked.live.push(handle);
        }
    }

    /// Spawns `future` on the runtime and registers it.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        self.register(tokio::spawn(future));
    }

    /// Number of tasks currently tracked as running.
    pub fn tracked(&self) -> usize {
        self.tracked.live.len()
    }

    /// Snapshot of the terminal-state counters since the last start.
    pub fn stats(&self) -> SupervisorStats {
        let counters = &self.tracked.counters;
        SupervisorStats {
            completed: counters.completed.load(Ordering::Relaxed),
            faulted: counters.faulted.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(tracked: Arc<Tracked>, interval: Duration, token: CancellationToken) {
    let mut scratch = Vec::new();

    loop {
        tracked.reap(&mut scratch);

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!(remaining = tracked.live.len(), "supervisor worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio::sync::oneshot;

    async fn explode() -> TaskResult {
        panic!("handler exploded");
    }

    async fn fail(message: String) -> TaskResult {
        Err(ServerError::Io(io::Error::other(message)))
    }

    async fn wait_for(supervisor: &Supervisor, total: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while supervisor.tracked() != 0 || supervisor.stats().total() != total {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("supervisor did not observe every task");
    }

    async fn finished(handle: &JoinHandle<TaskResult>) {
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reaps_a_thousand_tasks() {
        let supervisor = Supervisor::with_interval(Duration::from_millis(10));
        let cancel = CancellationToken::new();
        supervisor.start(&cancel).await;

        for i in 0..1000u64 {
            supervisor.spawn(async move {
                tokio::time::sleep(Duration::from_millis(i % 25)).await;
                if i % 10 == 0 {
                    fail(format!("task {i} failed")).await
                } else {
                    Ok(())
                }
            });
        }

        wait_for(&supervisor, 1000).await;
        assert_eq!(
            supervisor.stats(),
            SupervisorStats {
                completed: 900,
                faulted: 100,
                cancelled: 0,
            }
        );

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn finished_task_is_observed_at_registration() {
        let supervisor = Supervisor::new();
        let handle = tokio::spawn(fail("early".into()));
        finished(&handle).await;

        supervisor.register(handle);
        assert_eq!(supervisor.tracked(), 0);
        assert_eq!(supervisor.stats().faulted, 1);
    }

    #[tokio::test]
    async fn running_task_stays_tracked_until_it_ends() {
        let supervisor = Supervisor::with_interval(Duration::from_millis(5));
        let cancel = CancellationToken::new();
        supervisor.start(&cancel).await;

        let (tx, rx) = oneshot::channel::<()>();
        supervisor.spawn(async move {
            let _ = rx.await;
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(supervisor.tracked(), 1);
        assert_eq!(supervisor.stats().total(), 0);

        tx.send(()).unwrap();
        wait_for(&supervisor, 1).await;
        assert_eq!(supervisor.stats().completed, 1);

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn panics_and_aborts_are_observed() {
        let supervisor = Supervisor::with_interval(Duration::from_millis(5));
        let cancel = CancellationToken::new();
        supervisor.start(&cancel).await;

        supervisor.spawn(explode());

        let hanging = tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        hanging.abort();
        supervisor.register(hanging);

        wait_for(&supervisor, 2).await;
        let stats = supervisor.stats();
        assert_eq!(stats.faulted, 1);
        assert_eq!(stats.cancelled, 1);

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn restart_discards_tracked_tasks() {
        let supervisor = Supervisor::new();
        let cancel = CancellationToken::new();
        supervisor.start(&cancel).await;

        supervisor.spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        assert_eq!(supervisor.tracked(), 1);

        supervisor.start(&cancel).await;
        assert_eq!(supervisor.tracked(), 0);
        supervisor.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_fine() {
        let supervisor = Supervisor::new();
        supervisor.stop().await;
        supervisor.stop().await;
    }

    #[tokio::test]
    async fn parent_cancellation_stops_worker() {
        let supervisor = Supervisor::with_interval(Duration::from_millis(5));
        let cancel = CancellationToken::new();
        supervisor.start(&cancel).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), supervisor.stop())
            .await
            .expect("worker ignored cancellation");
    }
}
