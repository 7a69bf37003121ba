pub mod backend;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod task;
pub mod types;

pub use backend::{Backend, WorldView};
pub use command::{Command, FollowTarget, Goal};
pub use config::WaymarkConfig;
pub use error::{Result, WaymarkError};
pub use event::EventBus;
pub use task::{TaskKind, TaskState, TaskStatus};
pub use types::*;
