use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use waymark_core::backend::Backend;
use waymark_core::config::WaymarkConfig;
use waymark_core::event::{EventBus, TaskTransitions};
use waymark_core::task::TaskKind;
use waymark_core::types::FlowEvent;
use waymark_graph::SharedGraph;

use crate::completion::CompletionTracker;
use crate::executor::GraphExecutor;
use crate::status::ExecutionStatus;

/// Everything one editing session shares: the executor, the completion
/// tracker with its background poller, display status, and the event bus.
///
/// Must be opened inside a Tokio runtime. [`Session::close`] is the teardown
/// boundary; nothing is polled after it returns.
pub struct Session {
    executor: Arc<GraphExecutor>,
    tracker: Arc<CompletionTracker>,
    status: Arc<ExecutionStatus>,
    event_bus: Arc<EventBus>,
    poller_cancel: CancellationToken,
    poller: JoinHandle<()>,
}

impl Session {
    pub fn open(graph: SharedGraph, backend: Arc<dyn Backend>, config: &WaymarkConfig) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let tracker = Arc::new(CompletionTracker::new(
            config.tracker.clone(),
            event_bus.clone(),
        ));
        let status = Arc::new(ExecutionStatus::new(&config.status));

        let poller_cancel = CancellationToken::new();
        let poller = tokio::spawn(tracker.clone().run(backend.clone(), poller_cancel.clone()));

        let executor = Arc::new(GraphExecutor::new(
            graph,
            backend,
            tracker.clone(),
            status.clone(),
            event_bus.clone(),
            config.engine.clone(),
        ));
        debug!("Session opened");

        Self {
            executor,
            tracker,
            status,
            event_bus,
            poller_cancel,
            poller,
        }
    }

    pub fn executor(&self) -> &Arc<GraphExecutor> {
        &self.executor
    }

    pub fn tracker(&self) -> &Arc<CompletionTracker> {
        &self.tracker
    }

    pub fn status(&self) -> &Arc<ExecutionStatus> {
        &self.status
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.event_bus.subscribe()
    }

    pub fn task_transitions(&self, kind: Option<TaskKind>) -> TaskTransitions {
        self.event_bus.task_transitions(kind)
    }

    /// Stop the poller and fail anything still pending.
    pub async fn close(self) {
        self.poller_cancel.cancel();
        self.tracker.cancel_all();
        if let Err(e) = self.poller.await {
            warn!(error = %e, "Completion poller ended abnormally");
        }
        debug!("Session closed");
    }
}
