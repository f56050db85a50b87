use crate::metric::Builtins;
use crate::progress::deadline_after;
use crate::transaction::{TransactionData, TRANSACTION_HOOK};
use std::future::Future;
use std::num::NonZeroU64;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

/// Iterations shared by every VU of a run.
struct IterationBudget {
    limit: u64,
    claimed: AtomicU64,
}

impl IterationBudget {
    fn claim(&self) -> bool {
        self.claimed.fetch_add(1, Ordering::Relaxed) < self.limit
    }
}

/// Virtual users, each a task running the scenario in a loop until told to stop.
pub(crate) struct VuPool<T> {
    scenario: T,
    tasks: JoinSet<()>,
    spawned: usize,
    hook: TransactionData,
    builtins: Builtins,
    stop: Arc<AtomicBool>,
    budget: Option<Arc<IterationBudget>>,
}

impl<T, F> VuPool<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(
        scenario: T,
        hook: TransactionData,
        builtins: Builtins,
        iterations: Option<NonZeroU64>,
    ) -> Self {
        Self {
            scenario,
            tasks: JoinSet::new(),
            spawned: 0,
            hook,
            builtins,
            stop: Arc::new(AtomicBool::new(false)),
            budget: iterations.map(|limit| {
                Arc::new(IterationBudget {
                    limit: limit.get(),
                    claimed: AtomicU64::new(0),
                })
            }),
        }
    }

    pub fn spawn(&mut self, vus: usize) {
        for _ in 0..vus {
            let id = self.spawned;
            self.spawned += 1;

            let scenario = self.scenario.clone();
            let builtins = self.builtins.clone();
            let stop = self.stop.clone();
            let budget = self.budget.clone();

            let vu = async move {
                while !stop.load(Ordering::Relaxed) {
                    if let Some(budget) = &budget {
                        if !budget.claim() {
                            trace!("Iteration budget used up.");
                            break;
                        }
                    }

                    let start = Instant::now();
                    scenario().await;
                    builtins.iterations.add(1);
                    builtins.iteration_duration.add(start.elapsed());
                }
            };

            self.tasks.spawn(
                TRANSACTION_HOOK
                    .scope(self.hook.clone(), vu)
                    .instrument(tracing::debug_span!("vu", id)),
            );
        }
    }

    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for the next VU to exit. `None` once every VU has exited.
    pub async fn join_next(&mut self) -> Option<()> {
        let res = self.tasks.join_next().await?;
        if let Err(err) = res {
            error!("VU exited abnormally: {err}");
        }
        Some(())
    }

    /// Stops starting new iterations, waits up to `grace` for running ones, then aborts the
    /// rest. Returns how many VUs had to be aborted.
    pub async fn shutdown(mut self, grace: Duration) -> usize {
        self.stop.store(true, Ordering::Relaxed);

        let deadline = deadline_after(Instant::now(), grace);
        while !self.tasks.is_empty() {
            match timeout_at(deadline, self.join_next()).await {
                Ok(Some(())) => {}
                Ok(None) => break,
                Err(_) => break,
            }
        }

        let interrupted = self.tasks.len();
        if interrupted > 0 {
            warn!("Aborting {interrupted} VUs still running after {grace:?}.");
        }
        self.tasks.shutdown().await;
        interrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metrics;
    use std::collections::HashMap;

    fn pool<T, F>(scenario: T, iterations: Option<u64>) -> (VuPool<T>, Builtins)
    where
        T: Fn() -> F + Send + Sync + 'static + Clone,
        F: Future<Output = ()> + Send + 'static,
    {
        let metrics = Metrics::new();
        let builtins = Builtins::register(&metrics).unwrap();
        let hook = TransactionData {
            limiter: None,
            requests: builtins.http_reqs.clone(),
            duration: builtins.http_req_duration.clone(),
            tagged: Arc::new(HashMap::new()),
        };
        let pool = VuPool::new(
            scenario,
            hook,
            builtins.clone(),
            iterations.and_then(NonZeroU64::new),
        );
        (pool, builtins)
    }

    #[tokio::test]
    async fn budget_is_shared_by_all_vus() {
        let (mut pool, builtins) = pool(|| async { tokio::task::yield_now().await }, Some(7));
        pool.spawn(3);
        assert_eq!(pool.running(), 3);

        while pool.join_next().await.is_some() {}
        assert_eq!(builtins.iterations.get(), 7);
        assert_eq!(pool.shutdown(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn shutdown_lets_iterations_finish() {
        let (mut pool, builtins) = pool(
            || async { tokio::time::sleep(Duration::from_millis(20)).await },
            None,
        );
        pool.spawn(2);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let interrupted = pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(interrupted, 0);
        assert!(builtins.iterations.get() >= 2);
    }

    #[tokio::test]
    async fn unbounded_grace_waits_for_iterations() {
        let (mut pool, builtins) = pool(
            || async { tokio::time::sleep(Duration::from_millis(20)).await },
            None,
        );
        pool.spawn(2);
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(pool.shutdown(Duration::MAX).await, 0);
        assert_eq!(builtins.iterations.get(), 2);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn shutdown_aborts_stragglers() {
        let (mut pool, builtins) = pool(
            || async { tokio::time::sleep(Duration::from_secs(60)).await },
            None,
        );
        pool.spawn(4);
        tokio::task::yield_now().await;

        let interrupted = pool.shutdown(Duration::from_millis(20)).await;
        assert_eq!(interrupted, 4);
        assert_eq!(builtins.iterations.get(), 0);
        assert!(logs_contain("Aborting 4 VUs"));
    }
}
