use thiserror::Error;

use crate::task::TaskKind;

#[derive(Debug, Error)]
pub enum WaymarkError {
    // Backend errors
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Dispatch failed: {command}: {message}")]
    Dispatch { command: String, message: String },

    // Completion tracking errors
    #[error("Task timed out after {timeout_secs}s: {kind}")]
    TaskTimeout { kind: TaskKind, timeout_secs: u64 },

    #[error("Monitoring failed for {kind}: {message}")]
    Monitoring { kind: TaskKind, message: String },

    #[error("Task superseded by a newer {0} task")]
    TaskSuperseded(TaskKind),

    #[error("Execution cancelled")]
    Cancelled,

    // Graph errors
    #[error("Graph has no start node")]
    NoStartNode,

    #[error("Graph has {0} start nodes, expected exactly one")]
    MultipleStartNodes(usize),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    #[error("Invalid socket {socket} on node {node}")]
    InvalidSocket { node: String, socket: usize },

    #[error("Execution order revisits node {0}")]
    Cycle(String),

    #[error("Execution exceeded max steps ({0})")]
    MaxStepsExceeded(usize),

    #[error("Already running")]
    AlreadyRunning,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WaymarkError>;
