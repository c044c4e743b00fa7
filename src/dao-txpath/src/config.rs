//! Explicit configuration, threaded into each component's constructor.

use std::{fs, path::Path, time::Duration};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub host: HostConfig,
}

impl Config {
    pub fn from_json_file(path: &Path) -> Result<Self, std::io::Error> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(std::io::Error::other)
    }
}

/// Timeout and retry policy for idempotent collaborator reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcPolicy {
    pub timeout_ms: u64,
    pub max_retries: u32,
    /// First backoff; doubles on every retry.
    pub backoff_ms: u64,
}

impl Default for RpcPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 3,
            backoff_ms: 250,
        }
    }
}

impl RpcPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << retry.min(16)))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Multiplier applied to gas estimates.
    pub gas_fuzz_factor: f64,
    /// Share of the latest block gas limit a transaction may ask for.
    pub block_gas_limit_ratio: f64,
    /// Maximum number of forwarders between sender and target.
    pub max_hops: usize,
    /// Bound on in-flight capability queries while searching.
    pub max_concurrent_queries: usize,
    pub rpc: RpcPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            gas_fuzz_factor: 1.5,
            block_gas_limit_ratio: 0.95,
            max_hops: 8,
            max_concurrent_queries: 8,
            rpc: RpcPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Kernel address; never treated as an app.
    pub kernel: Option<Address>,
    /// Buffered permission updates per subscriber before it lags.
    pub update_capacity: usize,
    pub rpc: RpcPolicy,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            kernel: None,
            update_capacity: 1024,
            rpc: RpcPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: Config = serde_json::from_str(r#"{ "resolver": { "max_hops": 2, "rpc": { "max_retries": 0 } } }"#).unwrap();
        assert_eq!(cfg.resolver.max_hops, 2);
        assert_eq!(cfg.resolver.gas_fuzz_factor, 1.5);
        assert_eq!(cfg.resolver.rpc.max_retries, 0);
        assert_eq!(cfg.resolver.rpc.timeout_ms, 10_000);
        assert_eq!(cfg.host.update_capacity, 1024);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RpcPolicy { backoff_ms: 100, ..RpcPolicy::default() };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }
}
