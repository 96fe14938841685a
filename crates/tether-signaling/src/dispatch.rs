//! Per-session dispatch queue
//!
//! Every session owns one of these. Producers (the read loop, engine event
//! pumps) enqueue deferred work; the session's connection actor is the sole
//! consumer and drains one task at a time, which serializes all mutation of
//! the owning session. The queue owns no tasks or threads of its own.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;

/// One deferred unit of work owned by a session.
pub type QueuedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Default per-session capacity, sized for one client's worth of signaling.
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// Bounded FIFO of deferred tasks.
///
/// Capacity is fixed at construction and never resized. `try_enqueue` on a
/// full queue fails immediately; that return value is the only backpressure
/// signal producers get, and the caller decides what to do with it.
pub struct DispatchQueue {
    tasks: Mutex<VecDeque<QueuedTask>>,
    capacity: usize,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Queue one task. Returns false, without blocking, when the queue is
    /// full; the task is dropped in that case.
    pub fn try_enqueue(&self, task: QueuedTask) -> bool {
        let mut tasks = self.tasks.lock();
        if tasks.len() >= self.capacity {
            return false;
        }
        tasks.push_back(task);
        true
    }

    /// Run exactly one pending task to completion. Returns false when the
    /// queue was empty.
    ///
    /// Tasks run in enqueue order. The single-consumer contract is the
    /// caller's: only the owning session's actor may drain.
    pub async fn drain_one(&self) -> bool {
        // The lock is released before the task runs; a task may enqueue.
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                task.await;
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Advisory size; racy by nature.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn recording_task(log: &Arc<Mutex<Vec<usize>>>, n: usize) -> QueuedTask {
        let log = log.clone();
        Box::pin(async move {
            log.lock().push(n);
        })
    }

    #[tokio::test]
    async fn drains_in_fifo_order() {
        let queue = DispatchQueue::with_capacity(8);
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..5 {
            assert!(queue.try_enqueue(recording_task(&log, n)));
        }
        while queue.drain_one().await {}

        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn enqueue_fails_only_while_full() {
        let queue = DispatchQueue::with_capacity(2);
        let log = Arc::new(Mutex::new(Vec::new()));

        assert!(queue.try_enqueue(recording_task(&log, 0)));
        assert!(queue.try_enqueue(recording_task(&log, 1)));
        assert!(queue.is_full());
        assert!(!queue.try_enqueue(recording_task(&log, 2)));

        assert!(queue.drain_one().await);
        assert!(!queue.is_full());
        assert!(queue.try_enqueue(recording_task(&log, 3)));

        while queue.drain_one().await {}
        assert_eq!(*log.lock(), vec![0, 1, 3]);
    }

    #[tokio::test]
    async fn drain_on_empty_queue_is_false() {
        let queue = DispatchQueue::with_capacity(4);
        assert!(!queue.drain_one().await);
    }

    #[tokio::test]
    async fn tasks_may_enqueue_more_work() {
        let queue = Arc::new(DispatchQueue::with_capacity(4));
        let hits = Arc::new(AtomicUsize::new(0));

        let inner_queue = queue.clone();
        let inner_hits = hits.clone();
        assert!(queue.try_enqueue(Box::pin(async move {
            inner_hits.fetch_add(1, Ordering::SeqCst);
            let hits = inner_hits.clone();
            inner_queue.try_enqueue(Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        })));

        while queue.drain_one().await {}
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
