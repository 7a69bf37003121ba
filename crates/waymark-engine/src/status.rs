use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use waymark_core::config::StatusConfig;
use waymark_core::types::NodeId;

#[derive(Default)]
struct Inner {
    active_node: Option<NodeId>,
    running: bool,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
}

/// What the engine is doing right now, for display.
///
/// `is_executing` keeps answering true for a short hold after a run ends so
/// very quick runs stay visible.
pub struct ExecutionStatus {
    inner: Mutex<Inner>,
    hold: Duration,
}

impl ExecutionStatus {
    pub fn new(config: &StatusConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            hold: config.hold(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin_run(&self, node: NodeId) {
        let mut inner = self.lock();
        inner.active_node = Some(node);
        inner.running = true;
        inner.started_at = Some(Instant::now());
        inner.ended_at = None;
    }

    pub fn set_active(&self, node: NodeId) {
        self.lock().active_node = Some(node);
    }

    pub fn finish(&self) {
        let mut inner = self.lock();
        inner.running = false;
        inner.ended_at = Some(Instant::now());
    }

    pub fn active_node(&self) -> Option<NodeId> {
        self.lock().active_node.clone()
    }

    /// When the current or most recent run began.
    pub fn started_at(&self) -> Option<Instant> {
        self.lock().started_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.lock().ended_at
    }

    /// Time spent in the current run, or the length of the last one.
    pub fn run_duration(&self) -> Option<Duration> {
        let inner = self.lock();
        let started = inner.started_at?;
        Some(match inner.ended_at {
            Some(ended) => ended.saturating_duration_since(started),
            None => started.elapsed(),
        })
    }

    pub fn is_executing(&self) -> bool {
        let mut inner = self.lock();
        if inner.running {
            return true;
        }
        match inner.ended_at {
            Some(ended) if ended.elapsed() < self.hold => true,
            _ => {
                inner.active_node = None;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_hold_after_finish() {
        let status = ExecutionStatus::new(&StatusConfig { hold_secs: 3 });
        assert!(!status.is_executing());

        let node = NodeId::from_str("mine");
        status.begin_run(node.clone());
        assert!(status.is_executing());
        status.finish();

        tokio::time::advance(Duration::from_millis(2900)).await;
        assert!(status.is_executing());
        assert_eq!(status.active_node(), Some(node));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!status.is_executing());
        assert_eq!(status.active_node(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timing() {
        let status = ExecutionStatus::new(&StatusConfig { hold_secs: 3 });
        assert_eq!(status.started_at(), None);
        assert_eq!(status.run_duration(), None);

        let before = Instant::now();
        status.begin_run(NodeId::from_str("mine"));
        assert_eq!(status.started_at(), Some(before));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(status.run_duration(), Some(Duration::from_secs(4)));

        status.finish();
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(status.ended_at(), Some(before + Duration::from_secs(4)));
        assert_eq!(status.run_duration(), Some(Duration::from_secs(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_clears_previous_end() {
        let status = ExecutionStatus::new(&StatusConfig { hold_secs: 3 });
        status.begin_run(NodeId::from_str("a"));
        status.finish();
        tokio::time::advance(Duration::from_secs(10)).await;

        status.begin_run(NodeId::from_str("b"));
        status.set_active(NodeId::from_str("c"));
        assert!(status.is_executing());
        assert_eq!(status.active_node(), Some(NodeId::from_str("c")));
        assert_eq!(status.ended_at(), None);
    }
}
