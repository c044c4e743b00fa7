//! In-memory chain and registry, used by tests and by the CLI's fixture mode.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use dao_txpath_types::{
    AppArtifact, AppRegistry, ChainQuery, ForwardFee, ProxyInfo, QueryError, TransactionStep,
};

use crate::callscript;

const DEFAULT_GAS_ESTIMATE: u64 = 100_000;
const DEFAULT_BLOCK_GAS_LIMIT: u64 = 30_000_000;

/// Chain state held in maps. Unknown balances and allowances read as zero; forwarders
/// refuse every sender not registered with [`MockChain::with_forwarding`].
#[derive(Debug)]
pub struct MockChain {
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    forwarding: HashSet<(Address, Address)>,
    no_capability_query: HashSet<Address>,
    reverting: HashSet<Address>,
    fees: HashMap<Address, ForwardFee>,
    gas_estimates: HashMap<Address, u64>,
    default_gas: u64,
    block_gas_limit: u64,
    latency: Option<Duration>,
    failures_left: AtomicU32,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            balances: HashMap::new(),
            allowances: HashMap::new(),
            forwarding: HashSet::new(),
            no_capability_query: HashSet::new(),
            reverting: HashSet::new(),
            fees: HashMap::new(),
            gas_estimates: HashMap::new(),
            default_gas: DEFAULT_GAS_ESTIMATE,
            block_gas_limit: DEFAULT_BLOCK_GAS_LIMIT,
            latency: None,
            failures_left: AtomicU32::new(0),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, token: Address, owner: Address, amount: U256) -> Self {
        self.balances.insert((token, owner), amount);
        self
    }

    pub fn with_allowance(mut self, token: Address, owner: Address, spender: Address, amount: U256) -> Self {
        self.allowances.insert((token, owner, spender), amount);
        self
    }

    /// `forwarder.canForward(sender, _)` returns true.
    pub fn with_forwarding(mut self, forwarder: Address, sender: Address) -> Self {
        self.forwarding.insert((forwarder, sender));
        self
    }

    /// `forwarder` predates the capability query.
    pub fn without_capability_query(mut self, forwarder: Address) -> Self {
        self.no_capability_query.insert(forwarder);
        self
    }

    /// Every `canForward` call on `forwarder` reverts.
    pub fn reverting(mut self, forwarder: Address) -> Self {
        self.reverting.insert(forwarder);
        self
    }

    pub fn with_fee(mut self, forwarder: Address, token: Address, amount: U256) -> Self {
        self.fees.insert(forwarder, ForwardFee { token, amount });
        self
    }

    /// Estimate for transactions sent to `to`.
    pub fn with_gas_estimate(mut self, to: Address, gas: u64) -> Self {
        self.gas_estimates.insert(to, gas);
        self
    }

    pub fn with_default_gas_estimate(mut self, gas: u64) -> Self {
        self.default_gas = gas;
        self
    }

    pub fn with_block_gas_limit(mut self, limit: u64) -> Self {
        self.block_gas_limit = limit;
        self
    }

    /// Delay every query.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `n` queries with a transport error.
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Number of queries received so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of queries observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<InFlight<'_>, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QueryError::Transport("connection reset".into()));
        }
        Ok(guard)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainQuery for MockChain {
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, QueryError> {
        let _guard = self.enter().await?;
        Ok(self.allowances.get(&(token, owner, spender)).copied().unwrap_or_default())
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, QueryError> {
        let _guard = self.enter().await?;
        Ok(self.balances.get(&(token, owner)).copied().unwrap_or_default())
    }

    async fn can_forward(&self, forwarder: Address, sender: Address, script: &[u8]) -> Result<bool, QueryError> {
        let _guard = self.enter().await?;
        if self.no_capability_query.contains(&forwarder) {
            return Err(QueryError::NotImplemented);
        }
        if self.reverting.contains(&forwarder) {
            return Err(QueryError::Reverted("canForward".into()));
        }
        if let Err(e) = callscript::decode(script) {
            return Err(QueryError::Reverted(e.to_string()));
        }
        Ok(self.forwarding.contains(&(forwarder, sender)))
    }

    async fn forward_fee(&self, forwarder: Address) -> Result<ForwardFee, QueryError> {
        let _guard = self.enter().await?;
        self.fees.get(&forwarder).copied().ok_or(QueryError::NotImplemented)
    }

    async fn estimate_gas(&self, tx: &TransactionStep) -> Result<u64, QueryError> {
        let _guard = self.enter().await?;
        Ok(self.gas_estimates.get(&tx.to).copied().unwrap_or(self.default_gas))
    }

    async fn latest_block_gas_limit(&self) -> Result<u64, QueryError> {
        let _guard = self.enter().await?;
        Ok(self.block_gas_limit)
    }
}

/// Registry of known proxies and artifacts. Unknown proxies revert like a non-proxy
/// contract would.
#[derive(Debug, Default, Clone)]
pub struct MockRegistry {
    proxies: HashMap<Address, ProxyInfo>,
    artifacts: HashMap<(B256, Address), AppArtifact>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a proxy and the artifact of its code.
    pub fn with_app(mut self, proxy: Address, app_id: B256, code_address: Address, artifact: AppArtifact) -> Self {
        self.proxies.insert(proxy, ProxyInfo { app_id, code_address });
        self.artifacts.insert((app_id, code_address), artifact);
        self
    }

    /// Register an artifact for a code version without any proxy using it yet.
    pub fn with_artifact(mut self, app_id: B256, code_address: Address, artifact: AppArtifact) -> Self {
        self.artifacts.insert((app_id, code_address), artifact);
        self
    }
}

#[async_trait]
impl AppRegistry for MockRegistry {
    async fn proxy_info(&self, proxy: Address) -> Result<ProxyInfo, QueryError> {
        self.proxies
            .get(&proxy)
            .copied()
            .ok_or_else(|| QueryError::Reverted(format!("{proxy} is not an app proxy")))
    }

    async fn artifact(&self, app_id: B256, code_address: Address) -> Result<AppArtifact, QueryError> {
        self.artifacts
            .get(&(app_id, code_address))
            .cloned()
            .ok_or_else(|| QueryError::Reverted(format!("no artifact for {app_id} at {code_address}")))
    }
}
