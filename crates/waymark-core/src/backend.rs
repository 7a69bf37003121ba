use futures::future::BoxFuture;

use crate::command::Command;
use crate::error::Result;
use crate::task::{TaskKind, TaskStatus};
use crate::types::WorldPos;

/// Synchronous, read-only view of live world state.
///
/// Parameter resolution may consult it from any context, so implementations
/// must not block.
pub trait WorldView: Send + Sync {
    /// Current avatar position, if known.
    fn player_position(&self) -> Option<WorldPos>;
}

/// Automation backend: fire-and-forget commands plus polled status.
///
/// The backend exposes no completion callbacks. Callers infer completion by
/// polling [`Backend::status`] for the command's task kind.
pub trait Backend: WorldView + 'static {
    /// Whether the backend can be reached at all.
    fn is_available(&self) -> bool;

    /// Issue a command. Returns once the backend accepted it, not when the
    /// work is done.
    fn dispatch(&self, command: Command) -> BoxFuture<'_, Result<()>>;

    /// Report the current state of the process behind `kind`.
    fn status(&self, kind: TaskKind) -> BoxFuture<'_, Result<TaskStatus>>;

    /// Stop every running process.
    fn cancel_all(&self) -> BoxFuture<'_, Result<()>>;
}
