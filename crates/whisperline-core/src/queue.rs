use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type QueuedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Owner-scoped FIFO of deferred async tasks. At most one task is in flight
/// at any time; tasks run in submission order on a dedicated worker.
pub struct SerialQueue {
    tx: mpsc::UnboundedSender<QueuedTask>,
    closed: Arc<AtomicBool>,
}

impl SerialQueue {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedTask>();
        let closed = Arc::new(AtomicBool::new(false));
        let worker_closed = closed.clone();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                if worker_closed.load(Ordering::SeqCst) {
                    break;
                }
                task.await;
            }
        });
        Self { tx, closed }
    }

    /// Enqueue a task; the handle resolves with the task's result, or with a
    /// receive error if the queue was closed before the task ran.
    pub fn push<F, T>(&self, task: F) -> oneshot::Receiver<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done, handle) = oneshot::channel();
        if self.closed.load(Ordering::SeqCst) {
            return handle;
        }
        let queued: QueuedTask = Box::pin(async move {
            let _ = done.send(task.await);
        });
        let _ = self.tx.send(queued);
        handle
    }

    /// The in-flight task completes; queued tasks are not started.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}
