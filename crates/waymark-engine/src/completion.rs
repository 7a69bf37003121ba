//! Completion tracking for fire-and-forget backend commands.
//!
//! The backend never says "done", so each dispatched task is registered here
//! under its [`TaskKind`] and a poller infers progress from periodic status
//! queries. One pending task per kind: a new registration displaces the old.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use waymark_core::backend::Backend;
use waymark_core::config::TrackerConfig;
use waymark_core::error::{Result, WaymarkError};
use waymark_core::event::EventBus;
use waymark_core::task::{TaskKind, TaskState, TaskStatus};
use waymark_core::types::FlowEvent;

struct PendingTask {
    generation: u64,
    state: TaskState,
    started_at: Instant,
    tx: oneshot::Sender<Result<()>>,
}

type Registry = Arc<Mutex<HashMap<TaskKind, PendingTask>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<TaskKind, PendingTask>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Awaitable result of a tracked task.
pub struct CompletionHandle {
    kind: TaskKind,
    generation: u64,
    deadline: Instant,
    timeout: Duration,
    rx: oneshot::Receiver<Result<()>>,
    registry: Registry,
}

impl CompletionHandle {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Wait for the task to complete or fail.
    ///
    /// The timeout ceiling is also enforced here, so a waiter is released at
    /// the deadline even if the poller has not ticked yet.
    pub async fn wait(self) -> Result<()> {
        match tokio::time::timeout_at(self.deadline, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WaymarkError::Cancelled),
            Err(_) => {
                let mut pending = lock(&self.registry);
                if pending
                    .get(&self.kind)
                    .is_some_and(|t| t.generation == self.generation)
                {
                    pending.remove(&self.kind);
                }
                warn!(kind = %self.kind, "Tracked task timed out");
                Err(WaymarkError::TaskTimeout {
                    kind: self.kind,
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

/// Registry of pending tasks plus the state machine that advances them.
pub struct CompletionTracker {
    pending: Registry,
    next_generation: AtomicU64,
    config: TrackerConfig,
    event_bus: Arc<EventBus>,
}

impl CompletionTracker {
    pub fn new(config: TrackerConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            config,
            event_bus,
        }
    }

    /// Register a task of `kind`, displacing any pending one of the same kind.
    pub fn register(&self, kind: TaskKind) -> CompletionHandle {
        let (tx, rx) = oneshot::channel();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let started_at = Instant::now();
        let timeout = self.config.task_timeout();

        let displaced = lock(&self.pending).insert(
            kind,
            PendingTask {
                generation,
                state: TaskState::Starting,
                started_at,
                tx,
            },
        );
        if let Some(old) = displaced {
            warn!(kind = %kind, "Displacing pending task of the same kind");
            self.publish(kind, old.state, TaskState::Failed);
            let _ = old.tx.send(Err(WaymarkError::TaskSuperseded(kind)));
        }
        debug!(kind = %kind, generation, "Registered tracked task");

        CompletionHandle {
            kind,
            generation,
            deadline: deadline_after(started_at, timeout),
            timeout,
            rx,
            registry: self.pending.clone(),
        }
    }

    /// Fail every pending task and clear the registry.
    pub fn cancel_all(&self) {
        let drained: Vec<(TaskKind, PendingTask)> = lock(&self.pending).drain().collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "Cancelling all tracked tasks");
        }
        for (kind, task) in drained {
            self.publish(kind, task.state, TaskState::Failed);
            let _ = task.tx.send(Err(WaymarkError::Cancelled));
        }
    }

    pub fn pending_kinds(&self) -> Vec<TaskKind> {
        lock(&self.pending).keys().copied().collect()
    }

    pub fn state_of(&self, kind: TaskKind) -> Option<TaskState> {
        lock(&self.pending).get(&kind).map(|t| t.state)
    }

    /// Run the poller until `cancel` fires.
    pub async fn run(self: Arc<Self>, backend: Arc<dyn Backend>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            timeout_secs = self.config.task_timeout_secs,
            "Completion poller started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => {
                    info!("Completion poller shutting down");
                    break;
                }
            }
            self.poll_once(backend.as_ref()).await;
        }
    }

    /// A single poll over every pending task.
    ///
    /// Status queries run without the registry lock held; results for a
    /// registration that was displaced meanwhile are discarded.
    pub async fn poll_once(&self, backend: &dyn Backend) {
        let snapshot: Vec<(TaskKind, u64, TaskState, Instant)> = lock(&self.pending)
            .iter()
            .map(|(kind, t)| (*kind, t.generation, t.state, t.started_at))
            .collect();

        for (kind, generation, state, started_at) in snapshot {
            let elapsed = started_at.elapsed();
            if elapsed >= self.config.task_timeout() {
                warn!(kind = %kind, elapsed_ms = elapsed.as_millis() as u64, "Tracked task timed out");
                self.settle(
                    kind,
                    generation,
                    Err(WaymarkError::TaskTimeout {
                        kind,
                        timeout_secs: self.config.task_timeout_secs,
                    }),
                );
                continue;
            }

            // Goal setting has no backend process to wait on.
            if kind == TaskKind::Goal {
                self.settle(kind, generation, Ok(()));
                continue;
            }

            let status = match backend.status(kind).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Status query failed");
                    let err = match e {
                        e @ WaymarkError::Monitoring { .. } => e,
                        other => WaymarkError::Monitoring {
                            kind,
                            message: other.to_string(),
                        },
                    };
                    self.settle(kind, generation, Err(err));
                    continue;
                }
            };

            let past_grace = self
                .config
                .start_grace()
                .is_some_and(|grace| elapsed >= grace);
            match next_state(kind, state, status, past_grace) {
                TaskState::Completed => self.settle(kind, generation, Ok(())),
                next if next != state => self.advance(kind, generation, next),
                _ => {}
            }
        }
    }

    fn advance(&self, kind: TaskKind, generation: u64, next: TaskState) {
        let previous = {
            let mut pending = lock(&self.pending);
            match pending.get_mut(&kind) {
                Some(task) if task.generation == generation => {
                    std::mem::replace(&mut task.state, next)
                }
                _ => return,
            }
        };
        debug!(kind = %kind, from = ?previous, to = ?next, "Task state changed");
        self.publish(kind, previous, next);
    }

    /// Remove the registration and resolve its handle.
    fn settle(&self, kind: TaskKind, generation: u64, result: Result<()>) {
        let task = {
            let mut pending = lock(&self.pending);
            if !pending
                .get(&kind)
                .is_some_and(|t| t.generation == generation)
            {
                return;
            }
            pending.remove(&kind)
        };
        let Some(task) = task else { return };

        let to = if result.is_ok() {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        info!(kind = %kind, state = ?to, "Tracked task settled");
        self.publish(kind, task.state, to);
        let _ = task.tx.send(result);
    }

    fn publish(&self, kind: TaskKind, from: TaskState, to: TaskState) {
        self.event_bus
            .publish(FlowEvent::TaskStateChanged { kind, from, to });
    }
}

/// Roughly thirty years; stands in for deadlines the clock cannot hold.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Advance one task given a fresh backend status.
///
/// Path-like kinds finish in two steps: inactive with a queued path moves to
/// `Completing`, and only an empty queue completes. A task still `Starting`
/// once the grace window has passed with the backend fully idle is taken to
/// have finished before it could be observed.
pub fn next_state(kind: TaskKind, state: TaskState, status: TaskStatus, past_grace: bool) -> TaskState {
    let queued = kind.is_path_like() && status.queued_path;
    match state {
        TaskState::Starting => {
            if status.active || queued {
                TaskState::Active
            } else if past_grace {
                TaskState::Completed
            } else {
                TaskState::Starting
            }
        }
        TaskState::Active | TaskState::Completing => {
            if status.active {
                TaskState::Active
            } else if queued {
                TaskState::Completing
            } else {
                TaskState::Completed
            }
        }
        terminal => terminal,
    }
}
