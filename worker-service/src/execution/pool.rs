// Worker Pool
// Fixed number of workers draining a shared queue of execution units

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Runs queued work on at most `size` concurrent workers.
///
/// Each worker checks the cancellation token before pulling its next item,
/// so cancelling stops new work from starting without interrupting work
/// already in flight.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Process `items` and wait for every worker to finish.
    ///
    /// Outputs are returned in completion order. A panicking worker does not
    /// stop the others; the first join error is returned after all finish.
    pub async fn run<T, F, Fut>(
        &self,
        items: Vec<T>,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<Vec<Fut::Output>, JoinError>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let workers = self.size.min(items.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(items)));
        let work = Arc::new(work);
        let mut set = JoinSet::new();

        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let work = Arc::clone(&work);
            let cancel = cancel.clone();
            set.spawn(async move {
                let mut outputs = Vec::new();
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = queue.lock().await.pop_front();
                    let Some(item) = next else { break };
                    outputs.push(work(item).await);
                }
                outputs
            });
        }

        let mut outputs = Vec::new();
        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(mut produced) => outputs.append(&mut produced),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }
}
