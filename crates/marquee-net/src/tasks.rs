//! Owned set of revocable runtime tasks.

use std::future::Future;
use std::sync::Mutex;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

/// Tracks spawned tasks so they can all be aborted at once.  Dropping the
/// set aborts whatever is still running.
#[derive(Default)]
pub struct TaskSet {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` on the current Tokio runtime.  Returns `false` (and
    /// logs) when called outside a runtime.
    pub fn spawn<F>(&self, label: &'static str, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!(task = label, "No Tokio runtime in scope, task not scheduled");
            return false;
        };

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(runtime.spawn(future));
        true
    }

    /// Abort every tracked task, returning how many were still running.
    pub fn abort_all(&self) -> usize {
        let drained: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };

        let mut aborted = 0;
        for task in drained {
            if !task.is_finished() {
                aborted += 1;
            }
            task.abort();
        }
        aborted
    }

    /// Number of tasks that have not completed yet.
    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.abort_all();
    }
}
