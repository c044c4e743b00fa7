use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::AppArtifact;
use crate::transaction::TransactionStep;

/// Errors from chain or registry queries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The contract (or this provider) does not implement the query.
    #[error("query not implemented")]
    NotImplemented,
    /// The call executed and reverted. Never retried.
    #[error("call reverted: {0}")]
    Reverted(String),
    /// Transport-level failure; idempotent reads may be retried.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("query timed out")]
    Timeout,
}

impl QueryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::Transport(_) | QueryError::Timeout)
    }
}

/// Fee a forwarder charges per `forward` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardFee {
    pub token: Address,
    pub amount: U256,
}

/// Read-only chain access, implemented over RPC in production and in memory in tests.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// ERC-20 `allowance(owner, spender)`.
    async fn allowance(&self, _token: Address, _owner: Address, _spender: Address) -> Result<U256, QueryError> {
        Err(QueryError::NotImplemented)
    }

    /// ERC-20 `balanceOf(owner)`.
    async fn balance_of(&self, _token: Address, _owner: Address) -> Result<U256, QueryError> {
        Err(QueryError::NotImplemented)
    }

    /// Forwarder `canForward(sender, script)`.
    async fn can_forward(&self, _forwarder: Address, _sender: Address, _script: &[u8]) -> Result<bool, QueryError> {
        Err(QueryError::NotImplemented)
    }

    /// Forwarder `forwardFee()`.
    async fn forward_fee(&self, _forwarder: Address) -> Result<ForwardFee, QueryError> {
        Err(QueryError::NotImplemented)
    }

    async fn estimate_gas(&self, _tx: &TransactionStep) -> Result<u64, QueryError> {
        Err(QueryError::NotImplemented)
    }

    async fn latest_block_gas_limit(&self) -> Result<u64, QueryError> {
        Err(QueryError::NotImplemented)
    }
}

/// What the kernel knows about an app proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyInfo {
    pub app_id: B256,
    pub code_address: Address,
}

/// Package registry access: resolves app proxies and the artifact of each code version.
#[async_trait]
pub trait AppRegistry: Send + Sync {
    async fn proxy_info(&self, proxy: Address) -> Result<ProxyInfo, QueryError>;

    async fn artifact(&self, app_id: B256, code_address: Address) -> Result<AppArtifact, QueryError>;
}
