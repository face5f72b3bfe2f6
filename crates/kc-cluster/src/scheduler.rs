//! Cluster-aware periodic task scheduler.
//!
//! Each registered task gets a local tokio timer. On every tick the node
//! tries to take the cluster lock named after the task; only the winner runs
//! the body. Per task the local state moves `Idle -> Locked -> Running ->
//! Idle`, and a run never outlives its lease: the body is abandoned once the
//! lock TTL (the task interval) elapses.
//!
//! Cancelling a task stops its timer. A run already in progress finishes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use kc_core::config::LockRelease;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::error::{ClusterError, ClusterResult};
use crate::lock::ClusterLock;

/// A unit of periodic work.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Runs the task once.
    ///
    /// ## Errors
    ///
    /// Returned errors are logged; the next window runs the task again.
    async fn run(&self) -> kc_core::Result<()>;
}

/// Local execution state of a task on this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for the next tick.
    Idle,
    /// Lock acquired, body not started yet.
    Locked,
    /// Body executing.
    Running,
}

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The body finished successfully.
    Completed,
    /// The body returned an error.
    Failed(String),
    /// The body was abandoned when its lease ran out.
    TimedOut,
    /// Another lease was active; nothing ran.
    Skipped,
    /// The lock backend failed; nothing ran.
    LockUnavailable(String),
}

impl RunOutcome {
    /// Returns whether the body ran on this node.
    #[must_use]
    pub const fn ran(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::TimedOut)
    }
}

struct Registration {
    interval: Duration,
    task: Arc<dyn ScheduledTask>,
    state: Arc<Mutex<TaskState>>,
    cancel: watch::Sender<bool>,
}

/// Everything one execution needs, cloned out of the registration.
#[derive(Clone)]
struct Execution {
    name: Arc<str>,
    ttl: Duration,
    task: Arc<dyn ScheduledTask>,
    state: Arc<Mutex<TaskState>>,
    lock: Arc<dyn ClusterLock>,
    release: LockRelease,
}

impl Execution {
    #[instrument(skip(self), fields(task = %self.name, node = %self.lock.node_id()))]
    async fn execute(&self) -> RunOutcome {
        match self.lock.try_acquire(&self.name, self.ttl).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("lease held elsewhere, skipping window");
                return RunOutcome::Skipped;
            }
            Err(e) => {
                warn!(error = %e, "lock backend unavailable, skipping window");
                return RunOutcome::LockUnavailable(e.to_string());
            }
        }

        *self.state.lock() = TaskState::Locked;
        let started = Instant::now();
        *self.state.lock() = TaskState::Running;

        let outcome = match tokio::time::timeout(self.ttl, self.task.run()).await {
            Ok(Ok(())) => {
                debug!(elapsed_ms = started.elapsed().as_millis(), "task completed");
                RunOutcome::Completed
            }
            Ok(Err(e)) => {
                warn!(error = %e, "task failed");
                RunOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!(ttl_secs = self.ttl.as_secs(), "task exceeded its lease, abandoned");
                RunOutcome::TimedOut
            }
        };

        if self.release == LockRelease::OnCompletion
            && let Err(e) = self.lock.release(&self.name).await
        {
            warn!(error = %e, "failed to release lease, it will expire");
        }
        *self.state.lock() = TaskState::Idle;
        outcome
    }
}

/// Runs named periodic tasks, at most one node per task per window.
pub struct ClusterAwareScheduler {
    lock: Arc<dyn ClusterLock>,
    release: LockRelease,
    tasks: DashMap<String, Registration>,
}

impl ClusterAwareScheduler {
    /// Creates a scheduler that releases leases on completion.
    #[must_use]
    pub fn new(lock: Arc<dyn ClusterLock>) -> Self {
        Self {
            lock,
            release: LockRelease::OnCompletion,
            tasks: DashMap::new(),
        }
    }

    /// Sets the lease release policy.
    #[must_use]
    pub const fn with_release(mut self, release: LockRelease) -> Self {
        self.release = release;
        self
    }

    /// Identifier of the local node.
    #[must_use]
    pub fn node_id(&self) -> &str {
        self.lock.node_id()
    }

    /// Registers `task` under `name`, replacing any previous registration.
    /// The first tick fires one `interval` from now.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// ## Errors
    ///
    /// Returns `ClusterError::Configuration` for an empty name or a zero interval.
    pub fn schedule(
        &self,
        name: impl Into<String>,
        interval: Duration,
        task: Arc<dyn ScheduledTask>,
    ) -> ClusterResult<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(ClusterError::config("task name is empty"));
        }
        if interval.is_zero() {
            return Err(ClusterError::config(format!(
                "task '{name}' has a zero interval"
            )));
        }

        self.cancel(&name);

        let state = Arc::new(Mutex::new(TaskState::Idle));
        let (cancel, cancelled) = watch::channel(false);
        let execution = Execution {
            name: Arc::from(name.as_str()),
            ttl: interval,
            task: Arc::clone(&task),
            state: Arc::clone(&state),
            lock: Arc::clone(&self.lock),
            release: self.release,
        };
        // Cancel must never abort a run in progress, so the handle is not kept.
        tokio::spawn(run_timer(execution, interval, cancelled));

        info!(
            task = %name,
            interval_secs = interval.as_secs(),
            node = %self.lock.node_id(),
            "scheduled task"
        );
        self.tasks.insert(
            name,
            Registration {
                interval,
                task,
                state,
                cancel,
            },
        );
        Ok(())
    }

    /// Stops the timer of `name`. Returns false if nothing was registered.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.remove(name) {
            Some((_, registration)) => {
                let _ = registration.cancel.send(true);
                info!(task = %name, "cancelled task");
                true
            }
            None => false,
        }
    }

    /// Runs `name` once now through the same lease path as a tick.
    ///
    /// ## Errors
    ///
    /// Returns `ClusterError::NotScheduled` if no task has this name.
    pub async fn run_now(&self, name: &str) -> ClusterResult<RunOutcome> {
        let execution = {
            let registration = self
                .tasks
                .get(name)
                .ok_or_else(|| ClusterError::NotScheduled(name.to_string()))?;
            Execution {
                name: Arc::from(name),
                ttl: registration.interval,
                task: Arc::clone(&registration.task),
                state: Arc::clone(&registration.state),
                lock: Arc::clone(&self.lock),
                release: self.release,
            }
        };
        Ok(execution.execute().await)
    }

    /// Local state of `name`.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.tasks.get(name).map(|r| *r.state.lock())
    }

    /// Interval of `name`.
    #[must_use]
    pub fn interval(&self, name: &str) -> Option<Duration> {
        self.tasks.get(name).map(|r| r.interval)
    }

    /// Checks whether `name` is registered.
    #[must_use]
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Names of every registered task, sorted.
    #[must_use]
    pub fn scheduled_tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Cancels every task.
    pub fn shutdown(&self) {
        let names = self.scheduled_tasks();
        for name in names {
            self.cancel(&name);
        }
    }
}

impl Drop for ClusterAwareScheduler {
    fn drop(&mut self) {
        for entry in &self.tasks {
            let _ = entry.cancel.send(true);
        }
    }
}

impl std::fmt::Debug for ClusterAwareScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterAwareScheduler")
            .field("node_id", &self.lock.node_id())
            .field("release", &self.release)
            .field("tasks", &self.scheduled_tasks())
            .finish()
    }
}

async fn run_timer(execution: Execution, interval: Duration, mut cancelled: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = cancelled.changed() => {
                if changed.is_err() || *cancelled.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                // A cancel may have landed while the previous run was in flight.
                if *cancelled.borrow() {
                    break;
                }
                execution.execute().await;
            }
        }
    }
    debug!(task = %execution.name, "timer stopped");
}
