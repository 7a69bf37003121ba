use serde::{Deserialize, Serialize};

/// Fixed registry key for tracked backend work.
///
/// The completion tracker holds at most one pending task per kind, so these
/// identify a backend process rather than a node instance.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Navigation,
    Mining,
    Building,
    Exploring,
    Farming,
    Path,
    Goal,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::Navigation,
        TaskKind::Mining,
        TaskKind::Building,
        TaskKind::Exploring,
        TaskKind::Farming,
        TaskKind::Path,
        TaskKind::Goal,
    ];

    /// Path-like kinds keep walking a queued path segment after the backend
    /// reports the process inactive, so completion needs a second check.
    pub fn is_path_like(self) -> bool {
        matches!(self, TaskKind::Navigation | TaskKind::Path)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Navigation => "navigation",
            TaskKind::Mining => "mining",
            TaskKind::Building => "building",
            TaskKind::Exploring => "exploring",
            TaskKind::Farming => "farming",
            TaskKind::Path => "path",
            TaskKind::Goal => "goal",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Starting,
    Active,
    Completing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// What the backend reports about one task kind on a single poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStatus {
    /// The backend process for this kind is running.
    pub active: bool,
    /// A computed path is still queued for walking.
    pub queued_path: bool,
}

impl TaskStatus {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self {
            active: true,
            queued_path: false,
        }
    }

    pub fn draining() -> Self {
        Self {
            active: false,
            queued_path: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_like_kinds() {
        let path_like: Vec<_> = TaskKind::ALL
            .iter()
            .copied()
            .filter(|k| k.is_path_like())
            .collect();
        assert_eq!(path_like, vec![TaskKind::Navigation, TaskKind::Path]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Completing.is_terminal());
        assert!(!TaskState::Starting.is_terminal());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TaskKind::Exploring).unwrap();
        assert_eq!(json, "\"exploring\"");
    }
}
