//! Module collaborator interface and the task group its jobs run in.

use crate::object::RemoteObject;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// An addressable daemon exposing one root object.
///
/// The notification hooks are called by RPC workers before a failure is
/// translated into a wire error.
pub trait Module: Send + Sync + 'static {
    /// Identifier used for addressing and as the root of diagnostic paths.
    fn name(&self) -> &str;

    fn root(&self) -> Arc<dyn RemoteObject>;

    /// Informational message. RPC workers never raise these.
    fn notice(&self, _msg: &str) {}

    /// Attribute not found, or an application-level error raised by the
    /// target.
    fn alert(&self, _msg: &str) {}

    /// Unexpected failure, with full detail.
    fn error(&self, _msg: &str) {}
}

/// A module built from a name and a root object, with no-op hooks.
pub struct SimpleModule {
    name: String,
    root: Arc<dyn RemoteObject>,
}

impl SimpleModule {
    pub fn new(name: impl Into<String>, root: impl RemoteObject) -> Self {
        Self {
            name: name.into(),
            root: Arc::new(root),
        }
    }
}

impl Module for SimpleModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> Arc<dyn RemoteObject> {
        Arc::clone(&self.root)
    }
}

/// Jobs owned by a module; they all stop when the group shuts down.
#[derive(Clone, Default)]
pub struct TaskGroup {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a job that is dropped at its next suspension point once the
    /// group is cancelled.
    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = job => {}
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Cancel every job and wait for all of them to finish.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Wait until every job has finished on its own.
    pub async fn join(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_cancels_pending_jobs() {
        let group = TaskGroup::new();
        for _ in 0..3 {
            group.spawn(std::future::pending());
        }
        assert_eq!(group.len(), 3);
        tokio::time::timeout(Duration::from_secs(1), group.shutdown())
            .await
            .unwrap();
        assert!(group.is_empty());
        assert!(group.is_cancelled());
    }

    #[tokio::test]
    async fn test_join_waits_for_completion() {
        let group = TaskGroup::new();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let done = Arc::clone(&done);
            group.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        group.join().await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_simple_module() {
        let module = SimpleModule::new("calc", crate::ObjectTable::builder("calc").build());
        assert_eq!(module.name(), "calc");
        assert_eq!(module.root().describe(), "<object calc>");
    }
}
