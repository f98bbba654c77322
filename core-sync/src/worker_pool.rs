//! Bounded fan-out over a shared queue.
//!
//! A fixed number of lanes pull items from one queue until it is empty. Lanes
//! are plain futures joined on the calling task: nothing is spawned, and a
//! lane runs its items strictly one after another. [`WorkerPool::run`]
//! returns once every lane has drained.

use futures::future::join_all;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    lanes: usize,
}

impl WorkerPool {
    /// At least one lane is always used.
    pub fn new(lanes: usize) -> Self {
        Self { lanes: lanes.max(1) }
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Runs `handler` over `items` with at most `lanes` in flight.
    ///
    /// Results come back in completion order; pair them with their input
    /// inside `handler` when the caller needs to.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, handler: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let total = items.len();
        let queue = Mutex::new(VecDeque::from(items));
        let lanes = self.lanes.min(total.max(1));

        let lane_futures = (0..lanes).map(|lane| {
            let queue = &queue;
            let handler = &handler;
            async move {
                let mut results = Vec::new();
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .pop_front();
                    let Some(item) = next else {
                        break;
                    };
                    results.push(handler(item).await);
                }
                trace!(lane, processed = results.len(), "Lane drained");
                results
            }
        });

        join_all(lane_futures).await.into_iter().flatten().collect()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[core_async::test]
    async fn test_processes_every_item_once() {
        let pool = WorkerPool::new(3);
        let mut results = pool.run((0..20).collect(), |n: u32| async move { n * 2 }).await;
        results.sort();

        assert_eq!(results, (0..20).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[core_async::test]
    async fn test_concurrency_is_bounded_by_lanes() {
        let in_flight_count = AtomicUsize::new(0);
        let peak_count = AtomicUsize::new(0);
        let in_flight = &in_flight_count;
        let peak = &peak_count;

        let pool = WorkerPool::new(3);
        pool.run((0..12).collect::<Vec<u32>>(), move |_| async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            core_async::time::sleep(Duration::from_millis(5)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(peak_count.load(Ordering::SeqCst), 3);
        assert_eq!(in_flight_count.load(Ordering::SeqCst), 0);
    }

    #[core_async::test]
    async fn test_zero_lanes_still_processes() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.lanes(), 1);
        assert_eq!(pool.run(vec![1, 2, 3], |n| async move { n }).await, vec![1, 2, 3]);
    }

    #[core_async::test]
    async fn test_empty_input() {
        let results: Vec<u8> = WorkerPool::default().run(Vec::<u8>::new(), |n| async move { n }).await;
        assert!(results.is_empty());
    }
}
