//! Simulated progress for long-running pipeline tasks.
//!
//! Every running task owns exactly one ticker. The ticker's handle lives in
//! `tickers` keyed by task id and is aborted on every exit from `Running`;
//! a ticker that reaches 100% removes its own entry. The task list is held
//! in a `watch` channel so readers always see whole, consistent records.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use shared::domain::{Task, TaskId, TaskStatus};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_STEP: u8 = 10;
pub const DEFAULT_ITEMS_PER_MINUTE: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    pub tick_interval: Duration,
    /// Upper bound of the per-tick progress increment, in percentage points.
    pub max_step: u8,
    /// Throughput used for the initial remaining-time estimate.
    pub items_per_minute: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_step: DEFAULT_MAX_STEP,
            items_per_minute: DEFAULT_ITEMS_PER_MINUTE,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulatorError {
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error("cannot {action} task {id} while it is {from}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        action: &'static str,
    },
    #[error("no tokio runtime available to drive task {0}")]
    NoRuntime(TaskId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The task was not running and was left untouched.
    Skipped,
    Advanced,
    Completed,
}

/// Minutes the task is expected to take, at least one.
pub fn initial_estimate(total: u64, items_per_minute: u64) -> u32 {
    let minutes = total.div_ceil(items_per_minute.max(1)).max(1);
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

/// Applies one tick worth of `increment` percentage points to a running task.
pub fn advance(task: &mut Task, increment: u8, now: DateTime<Utc>) -> TickOutcome {
    if task.status != TaskStatus::Running {
        return TickOutcome::Skipped;
    }

    let next = u16::from(task.progress) + u16::from(increment);
    if next >= 100 {
        task.progress = 100;
        task.processed = task.total;
        task.ended_at = Some(now);
        task.status = TaskStatus::Completed;
        task.estimated_remaining_minutes = None;
        return TickOutcome::Completed;
    }

    task.progress = next as u8;
    task.processed = Task::processed_at(task.progress, task.total);
    task.estimated_remaining_minutes = task
        .estimated_remaining_minutes
        .map(|minutes| minutes.saturating_sub(1));
    TickOutcome::Advanced
}

struct Ticker {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    config: SimulatorConfig,
    tasks: watch::Sender<Vec<Task>>,
    tickers: Mutex<TickerTable>,
    rng: Mutex<StdRng>,
}

#[derive(Default)]
struct TickerTable {
    next_generation: u64,
    active: HashMap<TaskId, Ticker>,
}

pub struct ProgressSimulator {
    inner: Arc<Inner>,
}

impl ProgressSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Uses `rng` for tick increments; pass a seeded generator for replayable runs.
    pub fn with_rng(config: SimulatorConfig, rng: StdRng) -> Self {
        let (tasks, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                config,
                tasks,
                tickers: Mutex::new(TickerTable::default()),
                rng: Mutex::new(rng),
            }),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.inner.config
    }

    pub fn create(
        &self,
        name: impl Into<String>,
        category: impl Into<String>,
        total: u64,
    ) -> TaskId {
        let task = Task::pending(name, category, total);
        let id = task.id;
        info!(task = %id, name = %task.name, total, "task created");
        self.inner.tasks.send_modify(|tasks| tasks.push(task));
        id
    }

    /// Moves a pending task to running and starts its ticker. Starting a task
    /// that is already running does nothing.
    pub fn start(&self, id: TaskId) -> Result<(), SimulatorError> {
        let mut tickers = self.inner.lock_tickers();
        let estimate_rate = self.inner.config.items_per_minute;
        let now = Utc::now();
        let started = self.inner.update(id, |task| match task.status {
            TaskStatus::Pending => {
                task.status = TaskStatus::Running;
                task.started_at = Some(now);
                task.estimated_remaining_minutes =
                    Some(initial_estimate(task.total, estimate_rate));
                Ok(true)
            }
            TaskStatus::Running => Ok(false),
            from => Err(SimulatorError::InvalidTransition {
                id,
                from,
                action: "start",
            }),
        })?;

        if !tickers.active.contains_key(&id) {
            if let Err(err) = self.inner.spawn_ticker(&mut tickers, id) {
                if started {
                    let _ = self.inner.update(id, |task| {
                        task.status = TaskStatus::Pending;
                        task.started_at = None;
                        task.estimated_remaining_minutes = None;
                        Ok(true)
                    });
                }
                return Err(err);
            }
        }
        if started {
            info!(task = %id, "task started");
        } else {
            debug!(task = %id, "start ignored; task already running");
        }
        Ok(())
    }

    pub fn pause(&self, id: TaskId) -> Result<(), SimulatorError> {
        let mut tickers = self.inner.lock_tickers();
        self.inner.update(id, |task| match task.status {
            TaskStatus::Running => {
                task.status = TaskStatus::Paused;
                Ok(true)
            }
            from => Err(SimulatorError::InvalidTransition {
                id,
                from,
                action: "pause",
            }),
        })?;
        cancel_ticker(&mut tickers, id);
        info!(task = %id, "task paused");
        Ok(())
    }

    pub fn resume(&self, id: TaskId) -> Result<(), SimulatorError> {
        let mut tickers = self.inner.lock_tickers();
        self.inner.update(id, |task| match task.status {
            TaskStatus::Paused => {
                task.status = TaskStatus::Running;
                Ok(true)
            }
            from => Err(SimulatorError::InvalidTransition {
                id,
                from,
                action: "resume",
            }),
        })?;
        if !tickers.active.contains_key(&id) {
            if let Err(err) = self.inner.spawn_ticker(&mut tickers, id) {
                // Leave the task paused rather than running without a ticker.
                let _ = self.inner.update(id, |task| {
                    task.status = TaskStatus::Paused;
                    Ok(true)
                });
                return Err(err);
            }
        }
        info!(task = %id, "task resumed");
        Ok(())
    }

    /// External failure signal. Terminal tasks cannot fail again.
    pub fn fail(&self, id: TaskId, message: impl Into<String>) -> Result<(), SimulatorError> {
        let message = message.into();
        let mut tickers = self.inner.lock_tickers();
        let now = Utc::now();
        self.inner.update(id, |task| {
            if task.status.is_terminal() {
                return Err(SimulatorError::InvalidTransition {
                    id,
                    from: task.status,
                    action: "fail",
                });
            }
            task.status = TaskStatus::Failed;
            task.error = Some(message.clone());
            task.ended_at = Some(now);
            task.estimated_remaining_minutes = None;
            Ok(true)
        })?;
        cancel_ticker(&mut tickers, id);
        warn!(task = %id, error = %message, "task failed");
        Ok(())
    }

    /// Removes the task in any state, returning its last snapshot.
    pub fn delete(&self, id: TaskId) -> Result<Task, SimulatorError> {
        let mut tickers = self.inner.lock_tickers();
        let mut removed = None;
        self.inner.tasks.send_if_modified(|tasks| {
            let Some(index) = tasks.iter().position(|task| task.id == id) else {
                return false;
            };
            removed = Some(tasks.remove(index));
            true
        });
        let removed = removed.ok_or(SimulatorError::NotFound(id))?;
        cancel_ticker(&mut tickers, id);
        info!(task = %id, "task deleted");
        Ok(removed)
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.inner
            .tasks
            .borrow()
            .iter()
            .find(|task| task.id == id)
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.inner.tasks.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Task>> {
        self.inner.tasks.subscribe()
    }

    pub fn has_ticker(&self, id: TaskId) -> bool {
        self.inner.lock_tickers().active.contains_key(&id)
    }

    pub fn active_tickers(&self) -> usize {
        self.inner.lock_tickers().active.len()
    }

    /// Stops every ticker. Tasks keep their current state.
    pub fn shutdown(&self) {
        let mut tickers = self.inner.lock_tickers();
        for (id, ticker) in tickers.active.drain() {
            ticker.handle.abort();
            debug!(task = %id, "ticker stopped on shutdown");
        }
    }
}

impl Drop for ProgressSimulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn lock_tickers(&self) -> MutexGuard<'_, TickerTable> {
        self.tickers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_increment(&self) -> u8 {
        let max_step = self.config.max_step.max(1);
        self.rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .random_range(1..=max_step)
    }

    /// Runs `apply` against a copy of task `id` and publishes a new task list
    /// when it reports a change.
    fn update<F>(&self, id: TaskId, apply: F) -> Result<bool, SimulatorError>
    where
        F: FnOnce(&mut Task) -> Result<bool, SimulatorError>,
    {
        let mut outcome = Err(SimulatorError::NotFound(id));
        self.tasks.send_if_modified(|tasks| {
            let Some(index) = tasks.iter().position(|task| task.id == id) else {
                return false;
            };
            let mut task = tasks[index].clone();
            outcome = apply(&mut task);
            if !matches!(outcome, Ok(true)) {
                return false;
            }
            tasks[index] = task;
            true
        });
        outcome
    }

    fn spawn_ticker(
        self: &Arc<Self>,
        tickers: &mut TickerTable,
        id: TaskId,
    ) -> Result<(), SimulatorError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SimulatorError::NoRuntime(id))?;
        tickers.next_generation += 1;
        let generation = tickers.next_generation;
        let handle = runtime.spawn(run_ticker(
            Arc::downgrade(self),
            id,
            generation,
            self.config.tick_interval,
        ));
        tickers.active.insert(id, Ticker { generation, handle });
        debug!(task = %id, generation, "ticker spawned");
        Ok(())
    }

    /// One tick for task `id`. Returns whether the ticker should keep going.
    fn tick(&self, id: TaskId, generation: u64) -> bool {
        let mut tickers = self.lock_tickers();
        match tickers.active.get(&id) {
            Some(ticker) if ticker.generation == generation => {}
            _ => return false,
        }

        let increment = self.next_increment();
        let now = Utc::now();
        let mut outcome = TickOutcome::Skipped;
        let found = self.update(id, |task| {
            outcome = advance(task, increment, now);
            Ok(outcome != TickOutcome::Skipped)
        });

        match (found, outcome) {
            (Ok(_), TickOutcome::Advanced) => {
                debug!(task = %id, increment, "task advanced");
                true
            }
            (Ok(_), TickOutcome::Completed) => {
                tickers.active.remove(&id);
                info!(task = %id, "task completed");
                false
            }
            _ => {
                tickers.active.remove(&id);
                debug!(task = %id, "ticker stopped; task no longer running");
                false
            }
        }
    }
}

fn cancel_ticker(tickers: &mut TickerTable, id: TaskId) {
    if let Some(ticker) = tickers.active.remove(&id) {
        ticker.handle.abort();
        debug!(task = %id, generation = ticker.generation, "ticker cancelled");
    }
}

async fn run_ticker(inner: Weak<Inner>, id: TaskId, generation: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.tick(id, generation) {
            break;
        }
    }
}

#[cfg(test)]
#[path = "tests/simulator_tests.rs"]
mod tests;
