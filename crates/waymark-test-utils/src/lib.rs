//! Scripted backends and graph fixtures shared by Waymark tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use waymark_core::backend::{Backend, WorldView};
use waymark_core::command::Command;
use waymark_core::error::{Result, WaymarkError};
use waymark_core::task::{TaskKind, TaskStatus};
use waymark_core::types::{NodeId, WorldPos};
use waymark_graph::{CommandNode, Graph, NodeKind};

enum Scripted {
    Status(TaskStatus),
    Error(String),
}

/// Backend whose status replies are queued up front, per task kind.
///
/// Once a kind's queue runs dry the last status it returned repeats, and a
/// kind that was never scripted reports idle.
#[derive(Default)]
pub struct ScriptedBackend {
    unavailable: AtomicBool,
    fail_dispatch: AtomicBool,
    dispatch_delay: Mutex<Duration>,
    scripts: Mutex<HashMap<TaskKind, VecDeque<Scripted>>>,
    last: Mutex<HashMap<TaskKind, TaskStatus>>,
    dispatched: Mutex<Vec<Command>>,
    position: Mutex<Option<WorldPos>>,
    cancel_calls: AtomicUsize,
    status_polls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        let backend = Self::default();
        backend.unavailable.store(true, Ordering::SeqCst);
        backend
    }

    pub fn script(&self, kind: TaskKind, statuses: impl IntoIterator<Item = TaskStatus>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .extend(statuses.into_iter().map(Scripted::Status));
    }

    pub fn script_error(&self, kind: TaskKind, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(Scripted::Error(message.to_string()));
    }

    pub fn fail_dispatches(&self) {
        self.fail_dispatch.store(true, Ordering::SeqCst);
    }

    /// Make each dispatch take `delay` before the command is accepted.
    pub fn set_dispatch_delay(&self, delay: Duration) {
        *self.dispatch_delay.lock().unwrap() = delay;
    }

    pub fn set_position(&self, pos: Option<WorldPos>) {
        *self.position.lock().unwrap() = pos;
    }

    pub fn dispatched(&self) -> Vec<Command> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> usize {
        self.status_polls.load(Ordering::SeqCst)
    }
}

impl WorldView for ScriptedBackend {
    fn player_position(&self) -> Option<WorldPos> {
        *self.position.lock().unwrap()
    }
}

impl Backend for ScriptedBackend {
    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    fn dispatch(&self, command: Command) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let delay = *self.dispatch_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.fail_dispatch.load(Ordering::SeqCst) {
                return Err(WaymarkError::Dispatch {
                    command: command.name().to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            self.dispatched.lock().unwrap().push(command);
            Ok(())
        })
    }

    fn status(&self, kind: TaskKind) -> BoxFuture<'_, Result<TaskStatus>> {
        Box::pin(async move {
            self.status_polls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&kind)
                .and_then(VecDeque::pop_front);
            match next {
                Some(Scripted::Status(status)) => {
                    self.last.lock().unwrap().insert(kind, status);
                    Ok(status)
                }
                Some(Scripted::Error(message)) => Err(WaymarkError::Monitoring { kind, message }),
                None => Ok(self
                    .last
                    .lock()
                    .unwrap()
                    .get(&kind)
                    .copied()
                    .unwrap_or_default()),
            }
        })
    }

    fn cancel_all(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            self.scripts.lock().unwrap().clear();
            self.last.lock().unwrap().clear();
            Ok(())
        })
    }
}

/// Chain `Start -> nodes... -> End`. Returns the graph and the ids of the
/// given nodes, in order.
pub fn linear_graph(nodes: Vec<CommandNode>) -> (Graph, Vec<NodeId>) {
    let mut graph = Graph::new();
    let start = graph.add_node(CommandNode::new(NodeKind::Start));
    let mut prev = start;
    let mut ids = Vec::with_capacity(nodes.len());
    for node in nodes {
        let id = graph.add_node(node);
        graph.connect(&prev, 0, &id, 0).unwrap();
        ids.push(id.clone());
        prev = id;
    }
    let end = graph.add_node(CommandNode::new(NodeKind::End));
    graph.connect(&prev, 0, &end, 0).unwrap();
    (graph, ids)
}

/// `Start -> Mine(stone) -> End`.
pub fn start_mine_end() -> (Graph, NodeId) {
    let (graph, ids) = linear_graph(vec![CommandNode::new(NodeKind::Mine)]);
    (graph, ids[0].clone())
}
