//! Bulk deletion with a fixed-size worker pool.
//!
//! [`delete_all`] drains a shared queue of [`DeletionTask`]s with at most
//! `concurrency` workers. Every task produces exactly one
//! [`DeletionOutcome`]; a failing task never stops the batch.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::contract::{DeleteError, Deleter, DeletionOutcome, DeletionTask, OutcomeKind};

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(500);

/// Tuning for a bulk deletion run.
#[derive(Debug, Clone, Copy)]
pub struct BulkDeleteOptions {
    /// Number of concurrent workers.
    pub concurrency: NonZeroUsize,
    /// Pause a worker takes between two consecutive delete calls.
    pub throttle: Duration,
}

impl BulkDeleteOptions {
    pub fn new(concurrency: NonZeroUsize) -> Self {
        Self {
            concurrency,
            throttle: DEFAULT_THROTTLE,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }
}

impl Default for BulkDeleteOptions {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN))
    }
}

type Queue = Arc<Mutex<VecDeque<DeletionTask>>>;

/// Deletes every task using a bounded pool of workers and returns one
/// outcome per task, in completion order.
///
/// A delete call that panics is reported as a failed outcome for that task;
/// the worker moves on to the next one.
pub async fn delete_all<D>(
    deleter: Arc<D>,
    tasks: Vec<DeletionTask>,
    options: BulkDeleteOptions,
) -> Vec<DeletionOutcome>
where
    D: Deleter + ?Sized + 'static,
{
    if tasks.is_empty() {
        debug!("No deletion tasks, skipping worker pool");
        return Vec::new();
    }

    let total = tasks.len();
    let workers = options.concurrency.get().min(total);
    info!(total, workers, throttle = ?options.throttle, "Starting bulk deletion");

    let expected = tasks.clone();
    let queue: Queue = Arc::new(Mutex::new(tasks.into_iter().collect()));
    let (sender, mut receiver) = mpsc::unbounded_channel();

    let mut set = JoinSet::new();
    for worker_id in 0..workers {
        set.spawn(run_worker(
            worker_id,
            Arc::clone(&deleter),
            Arc::clone(&queue),
            sender.clone(),
            options.throttle,
        ));
    }
    drop(sender);

    let mut aborted_workers = 0usize;
    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            aborted_workers += 1;
            error!(error = %e, "Deletion worker aborted");
        }
    }

    let mut outcomes = Vec::with_capacity(total);
    while let Some(outcome) = receiver.recv().await {
        outcomes.push(outcome);
    }

    if aborted_workers > 0 {
        // Outcomes are sent as soon as they exist, so only the task an
        // aborted worker was holding can be missing.
        account_for_lost_tasks(&expected, &mut outcomes);
    }

    let summary = DeletionSummary::from_outcomes(&outcomes);
    info!(%summary, "Bulk deletion finished");
    outcomes
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

async fn run_worker<D>(
    worker_id: usize,
    deleter: Arc<D>,
    queue: Queue,
    outcomes: mpsc::UnboundedSender<DeletionOutcome>,
    throttle: Duration,
) where
    D: Deleter + ?Sized,
{
    let mut processed = 0usize;
    loop {
        let next = {
            let mut pending = queue.lock().unwrap_or_else(PoisonError::into_inner);
            pending.pop_front()
        };
        let Some(task) = next else { break };

        if processed > 0 && !throttle.is_zero() {
            tokio::time::sleep(throttle).await;
        }

        let result = AssertUnwindSafe(deleter.delete(&task))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(DeleteError::Failed(format!(
                    "delete panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        let outcome = match result {
            Ok(()) => {
                info!(worker = worker_id, task = %task, "Deleted");
                DeletionOutcome {
                    task,
                    kind: OutcomeKind::Deleted,
                    error: None,
                }
            }
            Err(DeleteError::NotFound) => {
                info!(worker = worker_id, task = %task, "Already absent");
                DeletionOutcome {
                    task,
                    kind: OutcomeKind::NotFound,
                    error: None,
                }
            }
            Err(DeleteError::Failed(detail)) => {
                warn!(worker = worker_id, task = %task, error = %detail, "Delete failed");
                DeletionOutcome {
                    task,
                    kind: OutcomeKind::Failed,
                    error: Some(detail),
                }
            }
        };
        processed += 1;
        if outcomes.send(outcome).is_err() {
            break;
        }
    }
    debug!(worker = worker_id, processed, "Worker drained queue");
}

fn account_for_lost_tasks(expected: &[DeletionTask], outcomes: &mut Vec<DeletionOutcome>) {
    let mut seen: HashMap<&DeletionTask, usize> = HashMap::new();
    for outcome in outcomes.iter() {
        *seen.entry(&outcome.task).or_default() += 1;
    }

    let mut lost = Vec::new();
    for task in expected {
        match seen.get_mut(task) {
            Some(count) if *count > 0 => *count -= 1,
            _ => lost.push(DeletionOutcome {
                task: task.clone(),
                kind: OutcomeKind::Failed,
                error: Some("deletion worker aborted before reporting".into()),
            }),
        }
    }
    outcomes.extend(lost);
}

/// Counts of each outcome kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub deleted: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl DeletionSummary {
    pub fn from_outcomes(outcomes: &[DeletionOutcome]) -> Self {
        outcomes
            .iter()
            .fold(DeletionSummary::default(), |mut acc, o| {
                match o.kind {
                    OutcomeKind::Deleted => acc.deleted += 1,
                    OutcomeKind::NotFound => acc.not_found += 1,
                    OutcomeKind::Failed => acc.failed += 1,
                }
                acc
            })
    }

    pub fn total(&self) -> usize {
        self.deleted + self.not_found + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for DeletionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deleted={} not_found={} failed={}",
            self.deleted, self.not_found, self.failed
        )
    }
}
