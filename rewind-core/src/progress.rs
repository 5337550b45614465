use crate::models::{ProgressStage, RollbackProgress};
use crate::paths::project_key;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Broadcast channels of [`RollbackProgress`], one per project path.
///
/// Delivery is best-effort: with nobody subscribed an event is dropped, and a
/// subscriber that falls more than `capacity` events behind skips ahead.
pub struct ProgressHub {
    capacity: usize,
    channels: DashMap<PathBuf, broadcast::Sender<RollbackProgress>>,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, cwd: &Path) -> broadcast::Receiver<RollbackProgress> {
        self.channels
            .entry(project_key(cwd))
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn emit(&self, cwd: &Path, progress: RollbackProgress) {
        debug!(
            "{:?} {}/{}: {}",
            progress.stage, progress.current, progress.total, progress.message
        );

        let Some(sender) = self.channels.get(&project_key(cwd)) else {
            trace!("no progress listener for {}", cwd.display());
            return;
        };
        if sender.receiver_count() == 0 {
            return;
        }
        let _ = sender.send(progress);
    }

    pub fn reporter(self: &Arc<Self>, cwd: &Path) -> ProgressReporter {
        ProgressReporter {
            hub: Arc::clone(self),
            cwd: cwd.to_path_buf(),
        }
    }
}

/// A hub bound to one project path.
#[derive(Clone)]
pub struct ProgressReporter {
    hub: Arc<ProgressHub>,
    cwd: PathBuf,
}

impl ProgressReporter {
    pub fn emit(&self, stage: ProgressStage, current: usize, total: usize, message: impl Into<String>) {
        self.hub
            .emit(&self.cwd, RollbackProgress::new(stage, current, total, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers_of_the_same_project() {
        let hub = Arc::new(ProgressHub::new(8));
        let mut rx = hub.subscribe(Path::new("/tmp/p1"));
        let mut other = hub.subscribe(Path::new("/tmp/p2"));

        hub.reporter(Path::new("/tmp/p1"))
            .emit(ProgressStage::Preparing, 1, 2, "backup");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.stage, ProgressStage::Preparing);
        assert_eq!(event.message, "backup");
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_emit_without_listener_is_dropped() {
        let hub = ProgressHub::new(2);
        for i in 0..10 {
            hub.emit(
                Path::new("/tmp/nobody"),
                RollbackProgress::new(ProgressStage::Reverting, i, 10, "x"),
            );
        }

        // Subscribing afterwards sees nothing from before.
        let mut rx = hub.subscribe(Path::new("/tmp/nobody"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_slow_subscriber_lags_instead_of_blocking() {
        let hub = ProgressHub::new(2);
        let mut rx = hub.subscribe(Path::new("/tmp/slow"));
        for i in 0..5 {
            hub.emit(
                Path::new("/tmp/slow"),
                RollbackProgress::new(ProgressStage::Reverting, i, 5, "x"),
            );
        }

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
        assert_eq!(rx.try_recv().unwrap().current, 3);
    }
}
