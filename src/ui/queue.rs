//! Task queue of the UI-owning thread.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Work posted to the UI-owning thread.
pub type UiTask = Box<dyn FnOnce() + Send>;

/// Groups posted callbacks so they can be cancelled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(pub &'static str);

/// Posts work to the UI-owning thread.
///
/// Hosts with their own main loop implement this over it; [`TaskQueue`]
/// serves hosts that drain the queue themselves.
pub trait UiHandler: Send + Sync {
    /// Runs `task` later on the UI-owning thread.
    fn post(&self, task: UiTask);

    /// Like [`UiHandler::post`], cancellable through `token`.
    fn post_with_token(&self, token: CallbackToken, task: UiTask);

    /// Drops every pending task posted with `token`.
    fn remove_callbacks(&self, token: CallbackToken);
}

/// FIFO queue drained by the owner of the UI thread.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<(Option<CallbackToken>, UiTask)>>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

impl TaskQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Number of queued tasks posted with `token`.
    pub fn pending_with_token(&self, token: CallbackToken) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|(task_token, _)| *task_token == Some(token))
            .count()
    }

    /// Runs queued tasks in order, including ones posted while running.
    ///
    /// The lock is released while each task runs so tasks may post more work.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.lock().pop_front();
            let Some((_, task)) = next else {
                return ran;
            };
            task();
            ran += 1;
        }
    }
}

impl UiHandler for TaskQueue {
    fn post(&self, task: UiTask) {
        self.tasks.lock().push_back((None, task));
    }

    fn post_with_token(&self, token: CallbackToken, task: UiTask) {
        self.tasks.lock().push_back((Some(token), task));
    }

    fn remove_callbacks(&self, token: CallbackToken) {
        self.tasks
            .lock()
            .retain(|(task_token, _)| *task_token != Some(token));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn removed_callbacks_never_run() {
        let queue = TaskQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let token = CallbackToken("refresh");

        for _ in 0..3 {
            let runs = Arc::clone(&runs);
            queue.post_with_token(token, Box::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let plain = Arc::clone(&runs);
        queue.post(Box::new(move || {
            plain.fetch_add(10, Ordering::SeqCst);
        }));

        queue.remove_callbacks(token);
        assert_eq!(queue.pending_with_token(token), 0);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 10);
    }
}
