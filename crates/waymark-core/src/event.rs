//! Run and task lifecycle events.
//!
//! Every [`FlowEvent`] goes to every subscriber. A slow subscriber loses the
//! oldest events rather than holding up the executor or the poller.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

use crate::task::{TaskKind, TaskState};
use crate::types::FlowEvent;

/// A task moving from one state to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub kind: TaskKind,
    pub from: TaskState,
    pub to: TaskState,
}

pub struct EventBus {
    tx: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    /// `capacity` is how many events a lagging subscriber can fall behind by.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to current subscribers. With none, the event is dropped.
    pub fn publish(&self, event: FlowEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to task state changes only, optionally for a single kind.
    pub fn task_transitions(&self, kind: Option<TaskKind>) -> TaskTransitions {
        TaskTransitions {
            rx: self.tx.subscribe(),
            kind,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Filtered view over the bus yielding [`Transition`]s.
pub struct TaskTransitions {
    rx: broadcast::Receiver<FlowEvent>,
    kind: Option<TaskKind>,
}

impl TaskTransitions {
    fn accept(&self, event: FlowEvent) -> Option<Transition> {
        match event {
            FlowEvent::TaskStateChanged { kind, from, to }
                if self.kind.map_or(true, |k| k == kind) =>
            {
                Some(Transition { kind, from, to })
            }
            _ => None,
        }
    }

    /// Next matching transition. `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<Transition> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if let Some(t) = self.accept(event) {
                        return Some(t);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Transition subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching transition already buffered, without waiting.
    pub fn try_next(&mut self) -> Option<Transition> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if let Some(t) = self.accept(event) {
                        return Some(t);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Transition subscriber lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Everything buffered right now.
    pub fn drain(&mut self) -> Vec<Transition> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(kind: TaskKind, from: TaskState, to: TaskState) -> FlowEvent {
        FlowEvent::TaskStateChanged { kind, from, to }
    }

    #[test]
    fn test_filters_by_kind() {
        let bus = EventBus::default();
        let mut mining = bus.task_transitions(Some(TaskKind::Mining));
        let mut all = bus.task_transitions(None);

        bus.publish(changed(TaskKind::Farming, TaskState::Starting, TaskState::Active));
        bus.publish(changed(TaskKind::Mining, TaskState::Starting, TaskState::Active));
        bus.publish(changed(TaskKind::Mining, TaskState::Active, TaskState::Completed));

        assert_eq!(
            mining.drain(),
            vec![
                Transition {
                    kind: TaskKind::Mining,
                    from: TaskState::Starting,
                    to: TaskState::Active,
                },
                Transition {
                    kind: TaskKind::Mining,
                    from: TaskState::Active,
                    to: TaskState::Completed,
                },
            ]
        );
        assert_eq!(all.drain().len(), 3);
        assert_eq!(all.try_next(), None);
    }

    #[test]
    fn test_lagging_subscriber_keeps_newest() {
        let bus = EventBus::new(2);
        let mut rx = bus.task_transitions(None);
        for to in [TaskState::Active, TaskState::Completing, TaskState::Completed] {
            bus.publish(changed(TaskKind::Navigation, TaskState::Starting, to));
        }

        let seen: Vec<TaskState> = rx.drain().into_iter().map(|t| t.to).collect();
        assert_eq!(seen, vec![TaskState::Completing, TaskState::Completed]);
    }

    #[tokio::test]
    async fn test_next_ends_when_bus_dropped() {
        let bus = EventBus::default();
        let mut rx = bus.task_transitions(Some(TaskKind::Building));
        bus.publish(changed(TaskKind::Building, TaskState::Starting, TaskState::Failed));
        drop(bus);

        assert_eq!(
            rx.next().await.map(|t| t.to),
            Some(TaskState::Failed)
        );
        assert_eq!(rx.next().await, None);
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::default();
        bus.publish(changed(TaskKind::Goal, TaskState::Starting, TaskState::Completed));
        let mut late = bus.task_transitions(None);
        assert_eq!(late.try_next(), None);
    }
}
