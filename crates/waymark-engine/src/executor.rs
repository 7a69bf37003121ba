use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLockReadGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use waymark_core::backend::{Backend, WorldView};
use waymark_core::command::Command;
use waymark_core::config::EngineConfig;
use waymark_core::error::{Result, WaymarkError};
use waymark_core::event::EventBus;
use waymark_core::types::{FlowEvent, NodeId, WorldPos};
use waymark_graph::{Graph, NodeKind, Resolver, SharedGraph};

use crate::completion::CompletionTracker;
use crate::status::ExecutionStatus;

/// Iteration bound for `while` control nodes without a `max_iterations`
/// parameter.
const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Result of a single [`GraphExecutor::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The node ran and the walk moved on to this one.
    Advanced(NodeId),
    /// The run is over.
    Finished,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Every node executed, nested actions included, in order.
    pub visited: Vec<NodeId>,
    pub started_at: DateTime<Utc>,
    pub total_elapsed_ms: u64,
}

#[derive(Default)]
struct RunState {
    current: Option<NodeId>,
    running: bool,
    steps: usize,
    visited: Vec<NodeId>,
    started: Option<(Instant, DateTime<Utc>)>,
}

enum Plan {
    Passive,
    Command(Command),
    Control {
        repeat: bool,
        sensor: Option<NodeId>,
        actions: Vec<NodeId>,
        max_iterations: usize,
    },
}

struct BackendWorld<'a>(&'a dyn Backend);

impl WorldView for BackendWorld<'_> {
    fn player_position(&self) -> Option<WorldPos> {
        self.0.player_position()
    }
}

/// Walks a command graph from its start node, one node per step.
///
/// Commands go to the backend fire-and-forget; tracked ones block the walk
/// on a [`CompletionTracker`] handle until the poller infers they finished.
pub struct GraphExecutor {
    graph: SharedGraph,
    backend: Arc<dyn Backend>,
    tracker: Arc<CompletionTracker>,
    status: Arc<ExecutionStatus>,
    event_bus: Arc<EventBus>,
    config: EngineConfig,
    state: Mutex<RunState>,
    cancel: Mutex<CancellationToken>,
}

impl GraphExecutor {
    pub fn new(
        graph: SharedGraph,
        backend: Arc<dyn Backend>,
        tracker: Arc<CompletionTracker>,
        status: Arc<ExecutionStatus>,
        event_bus: Arc<EventBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graph,
            backend,
            tracker,
            status,
            event_bus,
            config,
            state: Mutex::new(RunState::default()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_graph(&self) -> RwLockReadGuard<'_, Graph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().running
    }

    pub fn current_node(&self) -> Option<NodeId> {
        self.lock_state().current.clone()
    }

    /// Begin a run at the graph's start node.
    pub fn start(&self) -> Result<NodeId> {
        let mut state = self.lock_state();
        if state.running {
            return Err(WaymarkError::AlreadyRunning);
        }
        if !self.backend.is_available() {
            return Err(WaymarkError::BackendUnavailable(
                "backend did not respond".to_string(),
            ));
        }
        let start = self.read_graph().start_node()?;

        let now = Utc::now();
        *state = RunState {
            current: Some(start.clone()),
            running: true,
            steps: 0,
            visited: Vec::new(),
            started: Some((Instant::now(), now)),
        };
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();
        drop(state);

        self.status.begin_run(start.clone());
        info!(start_node = %start, "Starting graph run");
        self.event_bus.publish(FlowEvent::RunStarted {
            start_node: start.clone(),
            timestamp: now,
        });
        Ok(start)
    }

    /// Execute the current node and move to its successor.
    pub async fn step(&self) -> Result<StepOutcome> {
        let current = {
            let state = self.lock_state();
            match (&state.current, state.running) {
                (Some(current), true) => current.clone(),
                _ => return Ok(StepOutcome::Finished),
            }
        };
        let token = self.token();

        if let Err(e) = self.run_node(&current, &token).await {
            self.finish(Err(&e));
            return Err(e);
        }

        let next = {
            let graph = self.read_graph();
            match graph.node(&current).map(|n| n.kind()) {
                Some(NodeKind::End) | None => None,
                Some(_) => graph.next_node(&current).cloned(),
            }
        };

        match next {
            Some(next) => {
                self.lock_state().current = Some(next.clone());
                self.status.set_active(next.clone());
                Ok(StepOutcome::Advanced(next))
            }
            None => {
                self.finish(Ok(()));
                Ok(StepOutcome::Finished)
            }
        }
    }

    /// Run the whole graph to completion.
    pub async fn execute(&self) -> Result<ExecutionReport> {
        self.start()?;
        while let StepOutcome::Advanced(_) = self.step().await? {}

        let state = self.lock_state();
        let (started, started_at) = state.started.unwrap_or((Instant::now(), Utc::now()));
        Ok(ExecutionReport {
            visited: state.visited.clone(),
            started_at,
            total_elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Stop the run. In-flight waits fail with `Cancelled` and the backend is
    /// told to stop everything.
    pub async fn cancel(&self) -> Result<()> {
        info!("Cancelling graph run");
        self.token().cancel();
        self.tracker.cancel_all();
        self.backend.cancel_all().await
    }

    fn finish(&self, outcome: std::result::Result<(), &WaymarkError>) {
        {
            let mut state = self.lock_state();
            state.running = false;
            state.current = None;
        }
        self.status.finish();

        let reason = outcome.err().map(ToString::to_string);
        match &reason {
            None => info!("Graph run finished"),
            Some(reason) => warn!(reason = %reason, "Graph run stopped"),
        }
        self.event_bus.publish(FlowEvent::RunFinished {
            succeeded: reason.is_none(),
            reason,
            timestamp: Utc::now(),
        });
    }

    fn count_step(&self) -> Result<()> {
        let mut state = self.lock_state();
        state.steps += 1;
        let max = self.config.max_steps;
        if max > 0 && state.steps > max {
            return Err(WaymarkError::MaxStepsExceeded(max));
        }
        Ok(())
    }

    /// Resolve everything a node needs while holding the graph lock once.
    fn plan(&self, id: &NodeId) -> Result<(NodeKind, Plan)> {
        let graph = self.read_graph();
        let node = graph
            .node(id)
            .ok_or_else(|| WaymarkError::NodeNotFound(id.to_string()))?;
        let world = BackendWorld(self.backend.as_ref());
        let resolver = Resolver::new(&graph).with_world(&world);

        let plan = match node.kind() {
            NodeKind::Control => Plan::Control {
                repeat: node.mode() == Some("while"),
                sensor: node.sensor().cloned(),
                actions: node.actions().to_vec(),
                max_iterations: node
                    .parameter("max_iterations")
                    .map(|p| resolver.resolve_int(p).max(0) as usize)
                    .unwrap_or(DEFAULT_MAX_ITERATIONS),
            },
            _ => resolver
                .build_command(node)
                .map_or(Plan::Passive, Plan::Command),
        };
        Ok((node.kind(), plan))
    }

    fn run_node<'a>(
        &'a self,
        id: &'a NodeId,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if token.is_cancelled() {
                return Err(WaymarkError::Cancelled);
            }
            self.count_step()?;

            let (kind, plan) = self.plan(id)?;
            let started = Instant::now();
            self.status.set_active(id.clone());
            info!(node_id = %id, kind = kind.label(), "Executing node");
            self.event_bus.publish(FlowEvent::NodeStarted {
                node_id: id.clone(),
                kind: kind.label().to_string(),
            });

            match plan {
                Plan::Passive => {}
                Plan::Command(command) => self.run_command(command, token).await?,
                Plan::Control {
                    repeat,
                    sensor,
                    actions,
                    max_iterations,
                } => {
                    self.run_control(id, repeat, sensor.as_ref(), &actions, max_iterations, token)
                        .await?
                }
            }

            let elapsed_ms = started.elapsed().as_millis() as u64;
            debug!(node_id = %id, elapsed_ms, "Node complete");
            self.lock_state().visited.push(id.clone());
            self.event_bus.publish(FlowEvent::NodeCompleted {
                node_id: id.clone(),
                elapsed_ms,
            });
            Ok(())
        })
    }

    async fn run_command(&self, command: Command, token: &CancellationToken) -> Result<()> {
        match command {
            Command::Stop => {
                info!("Stopping all backend processes");
                self.tracker.cancel_all();
                self.backend.cancel_all().await
            }
            Command::Wait { millis } => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(()),
                    _ = token.cancelled() => Err(WaymarkError::Cancelled),
                }
            }
            command => {
                if !self.backend.is_available() {
                    return Err(WaymarkError::BackendUnavailable(
                        "backend went away mid-run".to_string(),
                    ));
                }
                let kind = command.task_kind();
                let name = command.name();
                let dispatched = tokio::select! {
                    result = self.backend.dispatch(command) => result,
                    _ = token.cancelled() => Err(WaymarkError::Cancelled),
                };
                if token.is_cancelled() {
                    // The stop may have reached the backend ahead of this command.
                    warn!(command = name, "Run cancelled during dispatch");
                    self.backend.cancel_all().await?;
                    return Err(WaymarkError::Cancelled);
                }
                dispatched?;
                debug!(command = name, "Dispatched command");

                let Some(kind) = kind else {
                    return Ok(());
                };
                let handle = self.tracker.register(kind);
                tokio::select! {
                    result = handle.wait() => result,
                    _ = token.cancelled() => {
                        self.tracker.cancel_all();
                        Err(WaymarkError::Cancelled)
                    }
                }
            }
        }
    }

    async fn run_control(
        &self,
        id: &NodeId,
        repeat: bool,
        sensor: Option<&NodeId>,
        actions: &[NodeId],
        max_iterations: usize,
        token: &CancellationToken,
    ) -> Result<()> {
        if !repeat {
            if self.sensor_holds(id, sensor) {
                for action in actions {
                    self.run_node(action, token).await?;
                }
            }
            return Ok(());
        }

        let mut iterations = 0;
        while self.sensor_holds(id, sensor) {
            if max_iterations > 0 && iterations >= max_iterations {
                warn!(node_id = %id, max_iterations, "Loop hit its iteration bound");
                break;
            }
            // An empty body would spin without ever yielding.
            if actions.is_empty() {
                break;
            }
            for action in actions {
                self.run_node(action, token).await?;
            }
            iterations += 1;
        }
        debug!(node_id = %id, iterations, "Loop exited");
        Ok(())
    }

    /// A missing sensor reads as true; a dangling one as false.
    fn sensor_holds(&self, control: &NodeId, sensor: Option<&NodeId>) -> bool {
        let Some(sensor) = sensor else {
            return true;
        };
        let value = {
            let graph = self.read_graph();
            let world = BackendWorld(self.backend.as_ref());
            let resolver = Resolver::new(&graph).with_world(&world);
            graph
                .node(sensor)
                .map(|node| resolver.evaluate_sensor(node))
                .unwrap_or(false)
        };
        debug!(control = %control, sensor = %sensor, value, "Sensor evaluated");
        self.event_bus.publish(FlowEvent::SensorEvaluated {
            node_id: sensor.clone(),
            value,
        });
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waymark_core::config::{StatusConfig, TrackerConfig};
    use waymark_core::task::{TaskKind, TaskStatus};
    use waymark_graph::CommandNode;
    use waymark_test_utils::{linear_graph, start_mine_end, ScriptedBackend};

    struct Harness {
        executor: Arc<GraphExecutor>,
        tracker: Arc<CompletionTracker>,
        poller: CancellationToken,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.poller.cancel();
        }
    }

    fn harness(graph: Graph, backend: Arc<ScriptedBackend>, config: EngineConfig) -> Harness {
        let bus = Arc::new(EventBus::default());
        let tracker = Arc::new(CompletionTracker::new(TrackerConfig::default(), bus.clone()));
        let poller = CancellationToken::new();
        tokio::spawn(tracker.clone().run(backend.clone(), poller.clone()));
        let executor = Arc::new(GraphExecutor::new(
            graph.shared(),
            backend,
            tracker.clone(),
            Arc::new(ExecutionStatus::new(&StatusConfig::default())),
            bus,
            config,
        ));
        Harness {
            executor,
            tracker,
            poller,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_mine_end_dispatches_once() {
        let (graph, mine) = start_mine_end();
        let backend = Arc::new(ScriptedBackend::new());
        backend.script(TaskKind::Mining, [TaskStatus::active(), TaskStatus::idle()]);
        let h = harness(graph, backend.clone(), EngineConfig::default());

        let report = h.executor.execute().await.unwrap();
        assert_eq!(
            backend.dispatched(),
            vec![Command::Mine {
                block: "stone".into(),
                quantity: 0
            }]
        );
        assert_eq!(report.visited.len(), 3);
        assert_eq!(report.visited[1], mine);
        assert!(!h.executor.is_running());
        assert!(h.tracker.pending_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_no_start_node() {
        let mut graph = Graph::new();
        graph.add_node(CommandNode::new(NodeKind::Mine));
        let h = harness(graph, Arc::new(ScriptedBackend::new()), EngineConfig::default());
        assert!(matches!(h.executor.start(), Err(WaymarkError::NoStartNode)));
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_fast() {
        let (graph, _) = start_mine_end();
        let backend = Arc::new(ScriptedBackend::unavailable());
        let h = harness(graph, backend.clone(), EngineConfig::default());

        assert!(matches!(
            h.executor.execute().await,
            Err(WaymarkError::BackendUnavailable(_))
        ));
        assert!(backend.dispatched().is_empty());
        assert!(h.tracker.pending_kinds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_rejected() {
        let (graph, _) = start_mine_end();
        let h = harness(graph, Arc::new(ScriptedBackend::new()), EngineConfig::default());
        h.executor.start().unwrap();
        assert!(matches!(h.executor.start(), Err(WaymarkError::AlreadyRunning)));
    }

    fn message(text: &str) -> CommandNode {
        CommandNode::new(NodeKind::Message).with_param("text", text)
    }

    #[tokio::test]
    async fn test_if_control_gated_by_sensor() {
        let (mut graph, ids) = linear_graph(vec![CommandNode::new(NodeKind::Control)]);
        let control = ids[0].clone();
        let sensor = graph.add_node(CommandNode::new(NodeKind::BooleanValue));
        let a = graph.add_node(message("a"));
        let b = graph.add_node(message("b"));
        graph.attach_sensor(&control, &sensor).unwrap();
        graph.attach_action(&control, &a).unwrap();
        graph.attach_action(&control, &b).unwrap();

        let backend = Arc::new(ScriptedBackend::new());
        let h = harness(graph.clone(), backend.clone(), EngineConfig::default());
        h.executor.execute().await.unwrap();
        assert!(backend.dispatched().is_empty());

        graph.node_mut(&sensor).unwrap().set_param("value", "true");
        let backend = Arc::new(ScriptedBackend::new());
        let h = harness(graph, backend.clone(), EngineConfig::default());
        h.executor.execute().await.unwrap();
        assert_eq!(
            backend.dispatched(),
            vec![
                Command::Message { text: "a".into() },
                Command::Message { text: "b".into() }
            ]
        );
    }

    #[tokio::test]
    async fn test_while_control_bounded_by_max_iterations() {
        let control = CommandNode::new(NodeKind::Control)
            .with_mode("while")
            .unwrap()
            .with_param("max_iterations", "3");
        let (mut graph, ids) = linear_graph(vec![control]);
        let body = graph.add_node(message("tick"));
        graph.attach_action(&ids[0], &body).unwrap();

        let backend = Arc::new(ScriptedBackend::new());
        let h = harness(graph, backend.clone(), EngineConfig::default());
        h.executor.execute().await.unwrap();
        assert_eq!(backend.dispatched().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_in_engine() {
        let wait = CommandNode::new(NodeKind::Wait).with_param("seconds", "2.5");
        let (graph, _) = linear_graph(vec![wait]);
        let backend = Arc::new(ScriptedBackend::new());
        let h = harness(graph, backend.clone(), EngineConfig::default());

        let started = Instant::now();
        h.executor.execute().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(2500));
        assert!(backend.dispatched().is_empty());
    }

    #[tokio::test]
    async fn test_stop_cancels_backend() {
        let (graph, _) = linear_graph(vec![CommandNode::new(NodeKind::Stop)]);
        let backend = Arc::new(ScriptedBackend::new());
        let h = harness(graph, backend.clone(), EngineConfig::default());
        h.executor.execute().await.unwrap();
        assert_eq!(backend.cancel_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_tracked_wait() {
        let (graph, _) = start_mine_end();
        let backend = Arc::new(ScriptedBackend::new());
        backend.script(TaskKind::Mining, [TaskStatus::active()]);
        let h = harness(graph, backend.clone(), EngineConfig::default());

        let executor = h.executor.clone();
        let run = tokio::spawn(async move { executor.execute().await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        h.executor.cancel().await.unwrap();

        assert!(matches!(run.await.unwrap(), Err(WaymarkError::Cancelled)));
        assert!(!h.executor.is_running());
        assert!(h.tracker.pending_kinds().is_empty());
        assert_eq!(backend.cancel_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_slow_dispatch_leaves_nothing_running() {
        let (graph, _) = start_mine_end();
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_dispatch_delay(Duration::from_millis(500));
        backend.script(TaskKind::Mining, [TaskStatus::active()]);
        let h = harness(graph, backend.clone(), EngineConfig::default());

        let executor = h.executor.clone();
        let run = tokio::spawn(async move { executor.execute().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.executor.cancel().await.unwrap();

        assert!(matches!(run.await.unwrap(), Err(WaymarkError::Cancelled)));
        // Let the abandoned dispatch deadline pass; the command must never land.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(backend.dispatched().is_empty());
        assert!(h.tracker.pending_kinds().is_empty());
        assert!(backend.cancel_calls() >= 2);
    }

    #[tokio::test]
    async fn test_max_steps_guard() {
        let (graph, _) = linear_graph(vec![message("a"), message("b")]);
        let h = harness(
            graph,
            Arc::new(ScriptedBackend::new()),
            EngineConfig { max_steps: 2 },
        );
        assert!(matches!(
            h.executor.execute().await,
            Err(WaymarkError::MaxStepsExceeded(2))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_failure_stops_run() {
        let (graph, _) = linear_graph(vec![message("a")]);
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail_dispatches();
        let h = harness(graph, backend, EngineConfig::default());
        assert!(matches!(
            h.executor.execute().await,
            Err(WaymarkError::Dispatch { .. })
        ));
        assert!(!h.executor.is_running());
    }

    #[tokio::test]
    async fn test_step_by_step() {
        let (graph, ids) = linear_graph(vec![message("only")]);
        let h = harness(graph, Arc::new(ScriptedBackend::new()), EngineConfig::default());

        let start = h.executor.start().unwrap();
        assert_eq!(h.executor.current_node(), Some(start));
        assert_eq!(
            h.executor.step().await.unwrap(),
            StepOutcome::Advanced(ids[0].clone())
        );
        assert!(matches!(
            h.executor.step().await.unwrap(),
            StepOutcome::Advanced(_)
        ));
        assert_eq!(h.executor.step().await.unwrap(), StepOutcome::Finished);
        assert_eq!(h.executor.step().await.unwrap(), StepOutcome::Finished);
    }
}
