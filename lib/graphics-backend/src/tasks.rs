//! CPU-side async loading support (the render thread never suspends; optional
//! worker threads exist for CPU-side async loading only"). Results are
//! re-integrated on the render thread before any Vulkan call touches them;
//! this queue only carries the completion signal and the payload, never a
//! Vulkan handle.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct PendingTask<T> {
    done: Arc<AtomicBool>,
    result: Mutex<Option<T>>,
}

/// A handle to a task submitted to the queue. `poll` is cheap (one atomic
/// load) and safe to call every frame from the render thread.
pub struct TaskHandle<T> {
    inner: Arc<PendingTask<T>>,
}

impl<T> TaskHandle<T> {
    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }

    /// Takes the result iff the task has completed. Returns `None` on a
    /// still-pending task or if already taken.
    pub fn take(&self) -> Option<T> {
        if !self.is_done() {
            return None;
        }
        self.inner.result.lock().take()
    }
}

/// A single mutex guards the pending-task vector; completion is observed via
/// an atomic bool per task, so polling never contends with producers.
#[derive(Default)]
pub struct AsyncTaskQueue<T> {
    pending: Mutex<Vec<Arc<PendingTask<T>>>>,
}

impl<T: Send + 'static> AsyncTaskQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Spawns `work` on a rayon worker and returns a handle the render
    /// thread can poll. `work` must only touch CPU-owned data (decoded
    /// pixel buffers, parsed mesh arrays) — never a Vulkan object.
    pub fn spawn(&self, work: impl FnOnce() -> T + Send + 'static) -> TaskHandle<T> {
        let task = Arc::new(PendingTask {
            done: Arc::new(AtomicBool::new(false)),
            result: Mutex::new(None),
        });
        self.pending.lock().push(task.clone());

        let task_for_worker = task.clone();
        rayon::spawn(move || {
            let result = work();
            *task_for_worker.result.lock() = Some(result);
            task_for_worker.done.store(true, Ordering::Release);
        });

        TaskHandle { inner: task }
    }

    /// Drops handles to tasks that have completed; call once per frame to
    /// bound memory growth of the pending set.
    pub fn reap_completed(&self) {
        self.pending.lock().retain(|t| !t.done.load(Ordering::Acquire));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn spawned_task_eventually_completes() {
        let queue: AsyncTaskQueue<i32> = AsyncTaskQueue::new();
        let handle = queue.spawn(|| {
            std::thread::sleep(Duration::from_millis(10));
            42
        });
        while !handle.is_done() {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(handle.take(), Some(42));
        assert_eq!(handle.take(), None);
    }

    #[test]
    fn reap_completed_drops_finished_tasks() {
        let queue: AsyncTaskQueue<i32> = AsyncTaskQueue::new();
        let handle = queue.spawn(|| 1);
        while !handle.is_done() {
            std::thread::sleep(Duration::from_millis(1));
        }
        queue.reap_completed();
        assert_eq!(queue.pending_count(), 0);
    }
}
