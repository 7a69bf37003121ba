use serde::{Deserialize, Serialize};

use crate::task::TaskKind;

/// A fully resolved backend command, built from a node's parameters at
/// dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    GotoXyz { x: i64, y: i64, z: i64 },
    GotoXz { x: i64, z: i64 },
    GotoY { y: i64 },
    GotoBlock { block: String },
    Mine { block: String, quantity: i64 },
    Build { schematic: String, x: i64, y: i64, z: i64 },
    Explore { x: i64, z: i64 },
    Farm { range: i64 },
    /// Start pathing toward the current goal.
    Path,
    SetGoal { goal: Goal },
    Follow { target: FollowTarget },
    Stop,
    Message { text: String },
    Wait { millis: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Goal {
    Xyz { x: i64, y: i64, z: i64 },
    Xz { x: i64, z: i64 },
    Y { y: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum FollowTarget {
    Player(String),
    Players,
    Entities,
}

impl Command {
    /// The tracker key for commands whose completion must be inferred by
    /// polling. `None` means the command completes as soon as it is issued.
    pub fn task_kind(&self) -> Option<TaskKind> {
        match self {
            Command::GotoXyz { .. }
            | Command::GotoXz { .. }
            | Command::GotoY { .. }
            | Command::GotoBlock { .. } => Some(TaskKind::Navigation),
            Command::Mine { .. } => Some(TaskKind::Mining),
            Command::Build { .. } => Some(TaskKind::Building),
            Command::Explore { .. } => Some(TaskKind::Exploring),
            Command::Farm { .. } => Some(TaskKind::Farming),
            Command::Path => Some(TaskKind::Path),
            Command::SetGoal { .. }
            | Command::Follow { .. }
            | Command::Stop
            | Command::Message { .. }
            | Command::Wait { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::GotoXyz { .. }
            | Command::GotoXz { .. }
            | Command::GotoY { .. }
            | Command::GotoBlock { .. } => "goto",
            Command::Mine { .. } => "mine",
            Command::Build { .. } => "build",
            Command::Explore { .. } => "explore",
            Command::Farm { .. } => "farm",
            Command::Path => "path",
            Command::SetGoal { .. } => "goal",
            Command::Follow { .. } => "follow",
            Command::Stop => "stop",
            Command::Message { .. } => "message",
            Command::Wait { .. } => "wait",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_commands() {
        assert_eq!(
            Command::GotoY { y: 12 }.task_kind(),
            Some(TaskKind::Navigation)
        );
        assert_eq!(
            Command::Mine {
                block: "stone".into(),
                quantity: 0
            }
            .task_kind(),
            Some(TaskKind::Mining)
        );
        assert_eq!(Command::Path.task_kind(), Some(TaskKind::Path));
    }

    #[test]
    fn test_immediate_commands() {
        assert!(Command::Stop.task_kind().is_none());
        assert!(Command::SetGoal {
            goal: Goal::Y { y: 64 }
        }
        .task_kind()
        .is_none());
        assert!(Command::Follow {
            target: FollowTarget::Players
        }
        .task_kind()
        .is_none());
    }

    #[test]
    fn test_serialization_tagged() {
        let json = serde_json::to_value(Command::Explore { x: 10, z: -4 }).unwrap();
        assert_eq!(json["type"], "explore");
        assert_eq!(json["z"], -4);
    }
}
