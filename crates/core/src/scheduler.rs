//! Deferred one-shot tasks driven by a cooperative tick.
//!
//! The host calls [`Scheduler::tick`] once per frame/loop iteration. Nothing
//! here sleeps or blocks: a task whose `ready_at` has not elapsed simply stays
//! queued until a later tick. Actions get `&mut` access to the host context
//! (usually the store) only while they run, so nothing is borrowed across the
//! wait.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------------

/// Monotonic time source, measured from the start of the host session.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Wall-clock backed session time.
#[derive(Debug, Clone)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.nanos.store(to.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// The deferred work itself. Receives the host context when it fires.
pub type TaskAction<C> = Box<dyn FnOnce(&mut C) -> Result<(), CoreError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Waiting,
    Fired,
}

pub struct PendingTask<C> {
    id: TaskId,
    label: String,
    ready_at: Duration,
    state: TaskState,
    action: Option<TaskAction<C>>,
}

impl<C> PendingTask<C> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ready_at(&self) -> Duration {
        self.ready_at
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Run the action if it has not run yet. A second call is a no-op.
    fn fire(&mut self, ctx: &mut C) -> Option<Result<(), CoreError>> {
        self.state = TaskState::Fired;
        self.action.take().map(|action| action(ctx))
    }
}

impl<C> fmt::Debug for PendingTask<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("ready_at", &self.ready_at)
            .field("state", &self.state)
            .finish()
    }
}

/// Outcome of one [`Scheduler::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks whose action completed.
    pub fired: Vec<TaskId>,
    /// Tasks whose action returned an error. They are not retried.
    pub failed: Vec<TaskId>,
    /// Tasks still waiting after this tick.
    pub remaining: usize,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler<C> {
    clock: Arc<dyn Clock>,
    queue: Vec<PendingTask<C>>,
    next_id: u64,
}

impl<C> Scheduler<C> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            queue: Vec::new(),
            next_id: 0,
        }
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Queue `action` to run on the first tick at or after
    /// `now + min_delay`.
    pub fn schedule<F>(
        &mut self,
        label: impl Into<String>,
        min_delay: Duration,
        action: F,
    ) -> TaskId
    where
        F: FnOnce(&mut C) -> Result<(), CoreError> + 'static,
    {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        let label = label.into();
        let ready_at = self.clock.now() + min_delay;

        tracing::debug!(
            task = %id,
            label = %label,
            ready_at_ms = ready_at.as_millis() as u64,
            "Task scheduled"
        );

        self.queue.push(PendingTask {
            id,
            label,
            ready_at,
            state: TaskState::Waiting,
            action: Some(Box::new(action)),
        });
        id
    }

    /// Fire every task whose time has come. Failures are logged and do not
    /// stop the remaining tasks.
    pub fn tick(&mut self, ctx: &mut C) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::default();

        let mut index = 0;
        while index < self.queue.len() {
            let task = &self.queue[index];
            if task.state != TaskState::Waiting || task.ready_at > now {
                index += 1;
                continue;
            }

            let mut task = self.queue.remove(index);
            match task.fire(ctx) {
                Some(Ok(())) => {
                    tracing::debug!(task = %task.id, label = %task.label, "Task fired");
                    report.fired.push(task.id);
                }
                Some(Err(e)) => {
                    tracing::error!(
                        task = %task.id,
                        label = %task.label,
                        error = %e,
                        "Task failed"
                    );
                    report.failed.push(task.id);
                }
                None => {}
            }
        }

        report.remaining = self.queue.len();
        report
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Earliest `ready_at` among queued tasks.
    pub fn next_ready_at(&self) -> Option<Duration> {
        self.queue.iter().map(|task| task.ready_at).min()
    }

    pub fn task(&self, id: TaskId) -> Option<&PendingTask<C>> {
        self.queue.iter().find(|task| task.id == id)
    }
}

impl<C> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queue", &self.queue)
            .field("next_id", &self.next_id)
            .finish()
    }
}
