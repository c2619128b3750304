//! Concurrency Fabric (§5): a bounded worker pool per expansion node, with
//! cancellation on first error shared across every fan-out.

use crate::error::{ListUsersError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A single fan-out pool instance, shared by clone across every recursive
/// sub-expansion of one request so breadth limiting and cancellation are
/// request-wide, not per-node.
#[derive(Clone)]
pub struct FanoutPool {
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl FanoutPool {
    pub fn new(breadth_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(breadth_limit)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs `tasks` under the pool's breadth limit. Admission blocks the
    /// producer when the pool is saturated (§5 "bounded fan-out"), but a
    /// cancellation from a sibling's earlier error is observed promptly: an
    /// admission still waiting when cancellation fires stops admitting
    /// further tasks rather than running them to completion (§5). The first
    /// task error cancels the shared token; every already-spawned task is
    /// still drained afterward so no producer is left blocked on a full
    /// channel (§5 "deadlock avoidance").
    pub async fn run<T, Fut>(&self, tasks: Vec<Fut>) -> Result<Vec<T>>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut set: JoinSet<Result<T>> = JoinSet::new();

        for task in tasks {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = self.semaphore.clone().acquire_owned() => permit
                    .map_err(|e| ListUsersError::Internal(anyhow::anyhow!("fanout pool closed: {e}")))?,
            };
            set.spawn(async move {
                let _permit = permit;
                task.await
            });
        }

        let mut results = Vec::new();
        let mut first_error = None;

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        self.cancel.cancel();
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        self.cancel.cancel();
                        first_error = Some(ListUsersError::Internal(anyhow::anyhow!(
                            "sub-expansion task panicked: {join_err}"
                        )));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_all_tasks_and_collects_results() {
        let pool = FanoutPool::new(4);
        let tasks: Vec<_> = (0..8)
            .map(|i| Box::pin(async move { Ok::<_, ListUsersError>(i) }) as std::pin::Pin<Box<dyn Future<Output = Result<i32>> + Send>>)
            .collect();
        let mut results = pool.run(tasks).await.unwrap();
        results.sort();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn first_error_cancels_token_but_drains_siblings() {
        let pool = FanoutPool::new(2);
        let token = pool.cancel_token();
        let tasks: Vec<std::pin::Pin<Box<dyn Future<Output = Result<i32>> + Send>>> = vec![
            Box::pin(async { Err(ListUsersError::TupleReadFailure("boom".to_string())) }),
            Box::pin(async { Ok(1) }),
            Box::pin(async { Ok(2) }),
        ];
        let result = pool.run(tasks).await;
        assert!(result.is_err());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_stops_admitting_further_tasks() {
        let pool = FanoutPool::new(1);
        pool.cancel_token().cancel();
        let tasks: Vec<std::pin::Pin<Box<dyn Future<Output = Result<i32>> + Send>>> =
            vec![Box::pin(async { Ok(1) }), Box::pin(async { Ok(2) })];
        let results = pool.run(tasks).await.unwrap();
        assert!(results.is_empty());
    }
}
