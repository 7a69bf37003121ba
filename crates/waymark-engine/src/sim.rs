//! In-process stand-in for a real automation backend.
//!
//! Each dispatched task reports active for a configured number of status
//! polls, then (for path-like kinds) keeps a queued path for a few more,
//! then goes idle. Goto commands move the simulated player to their target.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tracing::info;

use waymark_core::backend::{Backend, WorldView};
use waymark_core::command::Command;
use waymark_core::config::SimulationConfig;
use waymark_core::error::Result;
use waymark_core::task::{TaskKind, TaskStatus};
use waymark_core::types::WorldPos;

#[derive(Debug, Clone, Copy, Default)]
struct Countdown {
    active: u32,
    queued: u32,
}

struct SimState {
    tasks: HashMap<TaskKind, Countdown>,
    position: WorldPos,
}

pub struct SimulatedBackend {
    config: SimulationConfig,
    state: Mutex<SimState>,
}

impl SimulatedBackend {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SimState {
                tasks: HashMap::new(),
                position: WorldPos::new(0.0, 64.0, 0.0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorldView for SimulatedBackend {
    fn player_position(&self) -> Option<WorldPos> {
        Some(self.lock().position)
    }
}

impl Backend for SimulatedBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn dispatch(&self, command: Command) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            info!(command = command.name(), detail = ?command, "Simulated dispatch");
            let mut state = self.lock();
            match &command {
                Command::GotoXyz { x, y, z } => {
                    state.position = WorldPos::new(*x as f64, *y as f64, *z as f64);
                }
                Command::GotoXz { x, z } => {
                    state.position.x = *x as f64;
                    state.position.z = *z as f64;
                }
                Command::GotoY { y } => state.position.y = *y as f64,
                _ => {}
            }
            if let Some(kind) = command.task_kind() {
                let queued = if kind.is_path_like() {
                    self.config.queued_polls
                } else {
                    0
                };
                state.tasks.insert(
                    kind,
                    Countdown {
                        active: self.config.active_polls,
                        queued,
                    },
                );
            }
            Ok(())
        })
    }

    fn status(&self, kind: TaskKind) -> BoxFuture<'_, Result<TaskStatus>> {
        Box::pin(async move {
            let mut state = self.lock();
            let Some(task) = state.tasks.get_mut(&kind) else {
                return Ok(TaskStatus::idle());
            };
            let status = if task.active > 0 {
                task.active -= 1;
                TaskStatus::active()
            } else if task.queued > 0 {
                task.queued -= 1;
                TaskStatus::draining()
            } else {
                TaskStatus::idle()
            };
            if status == TaskStatus::idle() {
                state.tasks.remove(&kind);
            }
            Ok(status)
        })
    }

    fn cancel_all(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            info!("Simulated cancel");
            self.lock().tasks.clear();
            Ok(())
        })
    }
}
