// Batch scheduler
// Items pushed within one accumulation window are flushed together. The
// first push of a window spawns the flush task; the task sleeps for
// FLUSH_DELAY on the runtime timer, takes everything queued so far and
// re-arms the window. The boundary must be a timer, not a yield: on a
// multi-thread runtime another worker may run the task between two pushes.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How long a window stays open after its first push.
pub const FLUSH_DELAY: Duration = Duration::from_millis(1);

type FlushFn<T> = Arc<dyn Fn(Vec<T>) -> BoxFuture<'static, ()> + Send + Sync>;

struct BatchState<T> {
    items: Vec<T>,
    queued: bool,
}

/// Coalesces items enqueued within one accumulation window into a single flush.
///
/// Must be used from inside a tokio runtime.
pub struct BatchQueue<T> {
    state: Arc<Mutex<BatchState<T>>>,
    flush: FlushFn<T>,
}

fn lock<T>(state: &Mutex<BatchState<T>>) -> MutexGuard<'_, BatchState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Send + 'static> BatchQueue<T> {
    pub fn new<F, Fut>(flush: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let flush: FlushFn<T> = Arc::new(move |items| Box::pin(flush(items)));
        Self {
            state: Arc::new(Mutex::new(BatchState {
                items: Vec::new(),
                queued: false,
            })),
            flush,
        }
    }

    /// Append an item, opening a new window if none is pending.
    pub fn push(&self, item: T) {
        let schedule = {
            let mut state = lock(&self.state);
            state.items.push(item);
            !std::mem::replace(&mut state.queued, true)
        };

        if schedule {
            let state = self.state.clone();
            let flush = self.flush.clone();
            tokio::spawn(async move {
                tokio::time::sleep(FLUSH_DELAY).await;
                let items = {
                    let mut state = lock(&state);
                    state.queued = false;
                    std::mem::take(&mut state.items)
                };
                if !items.is_empty() {
                    flush(items).await;
                }
            });
        }
    }

    /// Take the first still-queued item matching `pred` out of the window.
    /// Returns `None` once the item has been flushed.
    pub fn remove_where<P>(&self, pred: P) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        let mut state = lock(&self.state);
        let index = state.items.iter().position(pred)?;
        Some(state.items.remove(index))
    }

    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for BatchQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            flush: self.flush.clone(),
        }
    }
}

impl<T> fmt::Debug for BatchQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("BatchQueue")
            .field("pending", &state.items.len())
            .field("queued", &state.queued)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn queue() -> (BatchQueue<u32>, mpsc::UnboundedReceiver<Vec<u32>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = BatchQueue::new(move |items| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(items);
            }
        });
        (queue, rx)
    }

    async fn settle() {
        tokio::time::sleep(FLUSH_DELAY * 10).await;
    }

    #[tokio::test]
    async fn test_items_in_one_tick_flush_together() {
        let (queue, mut rx) = queue();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);

        assert_eq!(rx.recv().await, Some(vec![1, 2, 3]));
        assert!(queue.is_empty());

        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_push_after_flush_opens_new_window() {
        let (queue, mut rx) = queue();
        queue.push(1);
        assert_eq!(rx.recv().await, Some(vec![1]));

        queue.push(2);
        queue.push(3);
        assert_eq!(rx.recv().await, Some(vec![2, 3]));
    }

    #[tokio::test]
    async fn test_emptied_window_does_not_flush() {
        let (queue, mut rx) = queue();
        queue.push(7);
        assert_eq!(queue.remove_where(|item| *item == 7), Some(7));

        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_after_flush_finds_nothing() {
        let (queue, mut rx) = queue();
        queue.push(4);
        queue.push(5);
        assert_eq!(queue.remove_where(|item| *item == 4), Some(4));
        assert_eq!(rx.recv().await, Some(vec![5]));
        assert_eq!(queue.remove_where(|item| *item == 5), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_window_holds_across_worker_threads() {
        let (queue, mut rx) = queue();
        for round in 0..100u32 {
            let (a, b) = (queue.clone(), queue.clone());
            tokio::join!(async move { a.push(round * 2) }, async move {
                b.push(round * 2 + 1)
            });
            assert_eq!(rx.recv().await, Some(vec![round * 2, round * 2 + 1]));
        }
    }
}
