use crate::metric::{Counter, Trend};
use governor::DefaultDirectRateLimiter;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Wraps a single request issued by a scenario.
///
/// Inside a running scenario this waits on the run's rate limiter (if `max_rps` is set), times
/// the request and records it into `http_reqs` and `http_req_duration`, plus
/// `http_req_duration{name:<tag>}` when a threshold asked for that sub-metric. Outside a
/// scenario the future is simply awaited.
///
/// The result is passed through untouched; deciding whether the call failed is up to the caller.
pub async fn transaction<T, R, E>(tag: &'static str, func: T) -> T::Output
where
    T: Future<Output = Result<R, E>>,
{
    if let Ok(hook) = TRANSACTION_HOOK.try_with(|v| v.clone()) {
        if let Some(limiter) = &hook.limiter {
            limiter.until_ready().await;
        }

        let start = Instant::now();
        let res = func.await;
        let elapsed = start.elapsed();

        hook.requests.add(1);
        hook.duration.add(elapsed);
        if let Some(trend) = hook.tagged.get(tag) {
            trend.add(elapsed);
        }

        #[cfg(feature = "metrics")]
        metrics::histogram!(volley_core::HTTP_REQ_DURATION, "name" => tag)
            .record(elapsed.as_secs_f64());

        if res.is_err() {
            tracing::trace!("Transaction {tag} returned an error after {elapsed:?}");
        }

        res
    } else {
        tracing::warn!("No hook available.");
        func.await
    }
}

#[derive(Clone)]
pub(crate) struct TransactionData {
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pub requests: Counter,
    pub duration: Trend,
    pub tagged: Arc<HashMap<String, Trend>>,
}

tokio::task_local! {
    pub(crate) static TRANSACTION_HOOK: TransactionData;
}
