//! Timeout and bounded retry for idempotent collaborator reads.

use std::future::Future;

use dao_txpath_types::QueryError;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::{config::RpcPolicy, errors::PathError};

/// A query that failed after the retry policy gave up (or immediately, if not retryable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub query: &'static str,
    pub attempts: u32,
    pub error: QueryError,
}

impl From<Exhausted> for PathError {
    fn from(e: Exhausted) -> Self {
        match e.error {
            QueryError::Timeout => PathError::RpcTimeout {
                query: e.query,
                attempts: e.attempts,
            },
            other => PathError::Rpc {
                query: e.query,
                reason: other.to_string(),
            },
        }
    }
}

/// Run `op` with a per-attempt timeout, retrying transport failures and timeouts.
pub async fn with_retry<T, F, Fut>(policy: &RpcPolicy, query: &'static str, mut op: F) -> Result<T, Exhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueryError>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let error = match timeout(policy.timeout(), op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => error,
            Err(_) => QueryError::Timeout,
        };

        if !error.is_retryable() || attempts > policy.max_retries {
            if error.is_retryable() {
                warn!(query, attempts, %error, "query failed, giving up");
            }
            return Err(Exhausted { query, attempts, error });
        }

        let backoff = policy.backoff(attempts - 1);
        debug!(query, attempts, %error, ?backoff, "retrying query");
        sleep(backoff).await;
    }
}
