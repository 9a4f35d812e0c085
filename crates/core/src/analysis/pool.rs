//! Bounded worker pool for per-file analysis.
//!
//! Each file comparison spawns git processes, so the number of tasks in
//! flight is capped by a semaphore. The limit belongs to the pool instance;
//! there is no process-wide limiter.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::AnalysisError;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl WorkerPool {
    /// Create a pool running at most `limit` tasks at once (minimum 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `task` over every item and return the outputs in input order.
    ///
    /// On cancellation, in-flight tasks are aborted, items not yet scheduled
    /// are abandoned, and no partial output is returned.
    pub async fn run<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        cancel: &CancellationToken,
        task: F,
    ) -> Result<Vec<T>, AnalysisError>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let total = items.len();
        let mut set = JoinSet::new();
        let mut outputs: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();

        for (index, item) in items.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    return Err(AnalysisError::Cancelled);
                }
                permit = self.semaphore.clone().acquire_owned() => {
                    permit.map_err(|e| AnalysisError::TaskFailed(e.to_string()))?
                }
            };
            let fut = task(item);
            set.spawn(async move {
                let output = fut.await;
                drop(permit);
                (index, output)
            });
        }
        debug!(total, limit = self.limit, "all tasks scheduled");

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    return Err(AnalysisError::Cancelled);
                }
                joined = set.join_next() => joined,
            };
            match joined {
                Some(Ok((index, output))) => outputs[index] = Some(output),
                Some(Err(e)) => {
                    set.abort_all();
                    return Err(AnalysisError::TaskFailed(e.to_string()));
                }
                None => break,
            }
        }

        outputs
            .into_iter()
            .map(|o| o.ok_or_else(|| AnalysisError::TaskFailed("task output missing".into())))
            .collect()
    }
}
