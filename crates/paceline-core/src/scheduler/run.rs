//! Batch driver: dispatch tasks to a bounded worker pool and collect
//! every outcome.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::budget::BudgetTracker;
use crate::retry::{run_with_retry, RetryPolicy, TaskError};

use super::progress::ProgressSnapshot;
use super::task::{Task, TaskOutcome};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Collects tasks, then runs them all to completion on a bounded pool.
///
/// The pool ceiling only has to be large enough to never become the
/// bottleneck itself: the budget window is the real admission gate, so a
/// few hundred workers comfortably cover batches whose throughput is
/// dictated by backend quota, not local compute.
pub struct Scheduler<T> {
    budget: Arc<BudgetTracker>,
    policy: RetryPolicy,
    max_workers: usize,
    tasks: Vec<Task<T>>,
}

impl<T: Send + 'static> Scheduler<T> {
    pub fn new(budget: Arc<BudgetTracker>, policy: RetryPolicy, max_workers: usize) -> Self {
        Self {
            budget,
            policy,
            max_workers: max_workers.max(1),
            tasks: Vec::new(),
        }
    }

    /// Register a unit of work with its declared cost. Call before
    /// [`Scheduler::run_batch`]; there is no registration while a batch
    /// runs.
    pub fn add_task(
        &mut self,
        label: impl Into<String>,
        cost: u64,
        work: impl FnMut(&str) -> Result<T, TaskError> + Send + 'static,
    ) {
        self.tasks.push(Task {
            label: label.into(),
            cost,
            work: Box::new(work),
        });
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Runs every registered task to completion and returns one outcome
    /// per task, failures included. Outcomes arrive in completion order,
    /// which is not deterministic under concurrency; callers must not
    /// rely on it matching registration order.
    ///
    /// Tasks are dispatched most expensive first, so the largest calls
    /// claim the window before swarms of small ones can starve them near
    /// the end of a run. Each worker blocks on budget admission (inside
    /// its retry loop) before doing real work.
    ///
    /// When `progress_tx` is given, a background ticker samples progress
    /// through the same locks as the writers and sends a snapshot every
    /// 500ms until the batch finishes. With zero registered tasks this
    /// returns an empty vec immediately: no workers, no ticker.
    pub async fn run_batch(
        mut self,
        progress_tx: Option<mpsc::Sender<ProgressSnapshot>>,
    ) -> Vec<TaskOutcome<T>> {
        if self.tasks.is_empty() {
            return Vec::new();
        }

        self.tasks.sort_by(|a, b| b.cost.cmp(&a.cost));
        let total_cost: u64 = self.tasks.iter().map(|t| t.cost).sum();
        let total_tasks = self.tasks.len();
        let state = Arc::new(BatchState::new(total_cost));

        let ticker = progress_tx.map(|tx| {
            tokio::spawn(progress_ticker(
                tx,
                Arc::clone(&state),
                Arc::clone(&self.budget),
                total_tasks,
            ))
        });

        let mut queue = self.tasks.into_iter();
        let mut join_set = tokio::task::JoinSet::new();
        loop {
            while join_set.len() < self.max_workers {
                let Some(task) = queue.next() else {
                    break;
                };
                let budget = Arc::clone(&self.budget);
                let policy = self.policy;
                let state = Arc::clone(&state);
                join_set.spawn(async move {
                    let Task {
                        label,
                        cost,
                        mut work,
                    } = task;
                    let worker_label = label.clone();
                    let joined = tokio::task::spawn_blocking(move || {
                        run_with_retry(&policy, &budget, cost, |guidance| work(guidance))
                    })
                    .await;
                    let outcome = match joined {
                        Ok(report) => TaskOutcome {
                            label,
                            cost,
                            attempts: report.attempts,
                            outcome: report.result,
                        },
                        Err(join_err) => {
                            tracing::error!(label = %worker_label, "worker panicked: {join_err}");
                            TaskOutcome {
                                label,
                                cost,
                                attempts: 0,
                                outcome: Err(TaskError::unclassified(format!(
                                    "worker panicked: {join_err}"
                                ))),
                            }
                        }
                    };
                    state.complete(outcome);
                });
            }

            if join_set.is_empty() {
                break;
            }
            let _ = join_set.join_next().await;
        }

        if let Some(handle) = ticker {
            let _ = handle.await;
        }

        // The ticker has exited, so the state is normally unshared here.
        match Arc::try_unwrap(state) {
            Ok(state) => state.into_outcomes(),
            Err(state) => state.drain_outcomes(),
        }
    }
}

/// Completion accounting shared between workers and the progress ticker.
/// Cost increment and outcome append happen under one lock, so two tasks
/// finishing concurrently never interleave their effects.
struct BatchState<T> {
    total_cost: u64,
    inner: Mutex<BatchInner<T>>,
}

struct BatchInner<T> {
    completed_cost: u64,
    outcomes: Vec<TaskOutcome<T>>,
}

impl<T> BatchState<T> {
    fn new(total_cost: u64) -> Self {
        Self {
            total_cost,
            inner: Mutex::new(BatchInner {
                completed_cost: 0,
                outcomes: Vec::new(),
            }),
        }
    }

    /// Record one finished task. Called exactly once per task.
    fn complete(&self, outcome: TaskOutcome<T>) {
        let mut inner = self.inner.lock().unwrap();
        inner.completed_cost += outcome.cost;
        inner.outcomes.push(outcome);
    }

    fn completed_count(&self) -> usize {
        self.inner.lock().unwrap().outcomes.len()
    }

    fn snapshot(&self, active_load: bool) -> ProgressSnapshot {
        let inner = self.inner.lock().unwrap();
        ProgressSnapshot {
            completed_cost: inner.completed_cost,
            total_cost: self.total_cost,
            active_load,
        }
    }

    fn into_outcomes(self) -> Vec<TaskOutcome<T>> {
        self.inner.into_inner().unwrap().outcomes
    }

    fn drain_outcomes(&self) -> Vec<TaskOutcome<T>> {
        std::mem::take(&mut self.inner.lock().unwrap().outcomes)
    }
}

/// Sends a snapshot on every tick until all tasks have completed. The
/// first tick fires immediately so consumers see a 0% line up front; the
/// final tick carries the 100% snapshot.
async fn progress_ticker<T>(
    tx: mpsc::Sender<ProgressSnapshot>,
    state: Arc<BatchState<T>>,
    budget: Arc<BudgetTracker>,
    total_tasks: usize,
) {
    let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
    loop {
        interval.tick().await;
        let done = state.completed_count() >= total_tasks;
        let snapshot = state.snapshot(budget.active_load());
        let _ = tx.try_send(snapshot);
        if done {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn open_budget() -> Arc<BudgetTracker> {
        Arc::new(BudgetTracker::new(1_000_000, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn empty_batch_returns_immediately_without_ticker() {
        let scheduler: Scheduler<()> =
            Scheduler::new(open_budget(), RetryPolicy::default(), 8);
        let (tx, mut rx) = mpsc::channel(16);
        let outcomes = scheduler.run_batch(Some(tx)).await;
        assert!(outcomes.is_empty());
        // No ticker ran: the channel closes without a single snapshot.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn one_outcome_per_task_with_failures_mixed_in() {
        let mut scheduler = Scheduler::new(open_budget(), RetryPolicy::default(), 16);
        for i in 0..20u64 {
            scheduler.add_task(format!("task-{i}"), i + 1, move |_| {
                if i % 4 == 0 {
                    Err(TaskError::unclassified("synthetic failure"))
                } else {
                    Ok(i)
                }
            });
        }
        let outcomes = scheduler.run_batch(None).await;
        assert_eq!(outcomes.len(), 20);
        let labels: HashSet<_> = outcomes.iter().map(|o| o.label.clone()).collect();
        assert_eq!(labels.len(), 20);
        assert_eq!(outcomes.iter().filter(|o| o.outcome.is_err()).count(), 5);
    }

    #[tokio::test]
    async fn dispatch_order_is_descending_cost() {
        let mut scheduler = Scheduler::new(open_budget(), RetryPolicy::default(), 1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, cost) in [("small", 10u64), ("large", 500), ("medium", 80)] {
            let order = Arc::clone(&order);
            scheduler.add_task(label, cost, move |_| {
                order.lock().unwrap().push(cost);
                Ok(())
            });
        }
        scheduler.run_batch(None).await;
        // One worker serializes execution, exposing the admission order.
        assert_eq!(*order.lock().unwrap(), vec![500, 80, 10]);
    }

    #[tokio::test]
    async fn worker_pool_is_bounded() {
        let mut scheduler = Scheduler::new(open_budget(), RetryPolicy::default(), 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for i in 0..8u64 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            scheduler.add_task(format!("t{i}"), 1, move |_| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }
        let outcomes = scheduler.run_batch(None).await;
        assert_eq!(outcomes.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn retries_happen_inside_the_worker() {
        let mut scheduler = Scheduler::new(open_budget(), RetryPolicy::new(7), 4);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        scheduler.add_task("flaky", 10, move |guidance| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(TaskError::format("truncated output"))
            } else {
                Ok(guidance.to_string())
            }
        });
        let outcomes = scheduler.run_batch(None).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].attempts, 3);
        let guidance = outcomes[0].outcome.as_ref().unwrap();
        assert!(guidance.contains("truncated output"));
    }

    #[tokio::test]
    async fn large_task_waits_for_window_drain() {
        // Limit 100 over a 300ms window, tasks costing 80/80/10: one 80
        // and the 10 are admitted immediately, the second 80 must wait
        // until the first record ages out of the window.
        let budget = Arc::new(BudgetTracker::new(100, Duration::from_millis(300)));
        let mut scheduler = Scheduler::new(Arc::clone(&budget), RetryPolicy::default(), 8);
        for (label, cost) in [("a", 80u64), ("b", 80), ("c", 10)] {
            scheduler.add_task(label, cost, move |_| Ok(cost));
        }
        let start = Instant::now();
        let outcomes = scheduler.run_batch(None).await;
        let elapsed = start.elapsed();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.outcome.is_ok()));
        let completed: u64 = outcomes.iter().map(|o| o.cost).sum();
        assert_eq!(completed, 170);
        assert!(
            elapsed >= Duration::from_millis(250),
            "batch finished in {:?}, before the window could drain",
            elapsed
        );
    }

    #[tokio::test]
    async fn progress_reaches_completion() {
        let mut scheduler = Scheduler::new(open_budget(), RetryPolicy::default(), 4);
        for i in 0..4u64 {
            scheduler.add_task(format!("t{i}"), 25, move |_| {
                std::thread::sleep(Duration::from_millis(10));
                Ok(())
            });
        }
        let (tx, mut rx) = mpsc::channel(64);
        let outcomes = scheduler.run_batch(Some(tx)).await;
        assert_eq!(outcomes.len(), 4);

        let mut snapshots = Vec::new();
        while let Some(s) = rx.recv().await {
            snapshots.push(s);
        }
        assert!(!snapshots.is_empty());
        for pair in snapshots.windows(2) {
            assert!(pair[0].completed_cost <= pair[1].completed_cost);
        }
        let last = snapshots.last().unwrap();
        assert_eq!(last.completed_cost, 100);
        assert_eq!(last.total_cost, 100);
        assert_eq!(last.percent(), 100);
    }
}
