//! JSON description of a DAO and the chain around it, served through the in-memory mocks.

use std::{fs, path::Path};

use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use dao_txpath::{
    mock::{MockChain, MockRegistry},
    Config,
};
use dao_txpath_types::{AppArtifact, ArtifactManifest, ChainEvent};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Fixture {
    pub config: Config,
    /// Installed app proxies.
    pub apps: Vec<AppFixture>,
    /// Code versions no proxy points at yet (upgrade targets).
    pub artifacts: Vec<ArtifactFixture>,
    /// Kernel and ACL logs, in any order.
    pub events: Vec<ChainEvent>,
    pub chain: ChainFixture,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppFixture {
    pub proxy: Address,
    pub app_id: B256,
    pub code_address: Address,
    pub artifact: ArtifactManifest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactFixture {
    pub app_id: B256,
    pub code_address: Address,
    pub artifact: ArtifactManifest,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChainFixture {
    pub balances: Vec<Balance>,
    pub allowances: Vec<Allowance>,
    /// `(forwarder, sender)` pairs for which `canForward` returns true.
    pub forwarding: Vec<Forwarding>,
    pub no_capability_query: Vec<Address>,
    /// Forwarders whose `canForward` reverts.
    pub reverting: Vec<Address>,
    pub fees: Vec<Fee>,
    pub gas_estimates: Vec<GasEstimate>,
    pub default_gas_estimate: Option<u64>,
    pub block_gas_limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Balance {
    pub token: Address,
    pub owner: Address,
    pub amount: U256,
}

#[derive(Debug, Deserialize)]
pub struct Allowance {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    pub amount: U256,
}

#[derive(Debug, Deserialize)]
pub struct Forwarding {
    pub forwarder: Address,
    pub sender: Address,
}

#[derive(Debug, Deserialize)]
pub struct Fee {
    pub forwarder: Address,
    pub token: Address,
    pub amount: U256,
}

#[derive(Debug, Deserialize)]
pub struct GasEstimate {
    pub to: Address,
    pub gas: u64,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed parsing fixture {}", path.display()))
    }

    pub fn registry(&self) -> Result<MockRegistry> {
        let mut registry = MockRegistry::new();
        for app in &self.apps {
            let artifact = AppArtifact::from_manifest(&app.artifact)
                .with_context(|| format!("invalid artifact for app {}", app.proxy))?;
            registry = registry.with_app(app.proxy, app.app_id, app.code_address, artifact);
        }
        for version in &self.artifacts {
            let artifact = AppArtifact::from_manifest(&version.artifact)
                .with_context(|| format!("invalid artifact for code {}", version.code_address))?;
            registry = registry.with_artifact(version.app_id, version.code_address, artifact);
        }
        Ok(registry)
    }

    pub fn chain(&self) -> MockChain {
        let facts = &self.chain;
        let mut chain = MockChain::new();
        for b in &facts.balances {
            chain = chain.with_balance(b.token, b.owner, b.amount);
        }
        for a in &facts.allowances {
            chain = chain.with_allowance(a.token, a.owner, a.spender, a.amount);
        }
        for f in &facts.forwarding {
            chain = chain.with_forwarding(f.forwarder, f.sender);
        }
        for forwarder in &facts.no_capability_query {
            chain = chain.without_capability_query(*forwarder);
        }
        for forwarder in &facts.reverting {
            chain = chain.reverting(*forwarder);
        }
        for fee in &facts.fees {
            chain = chain.with_fee(fee.forwarder, fee.token, fee.amount);
        }
        for g in &facts.gas_estimates {
            chain = chain.with_gas_estimate(g.to, g.gas);
        }
        if let Some(gas) = facts.default_gas_estimate {
            chain = chain.with_default_gas_estimate(gas);
        }
        if let Some(limit) = facts.block_gas_limit {
            chain = chain.with_block_gas_limit(limit);
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use dao_txpath::{DaoHost, Intent, PathResolver, TransactionAssembler};

    use super::*;

    const SAMPLE: &str = include_str!("../fixtures/token-manager.json");

    #[test]
    fn sample_fixture_parses() {
        let fixture: Fixture = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(fixture.apps.len(), 2);
        assert_eq!(fixture.events.len(), 3);
        assert_eq!(fixture.config.resolver.max_hops, 4);
        fixture.registry().unwrap();
    }

    #[tokio::test]
    async fn sample_fixture_resolves_through_voting() {
        let fixture: Fixture = serde_json::from_str(SAMPLE).unwrap();
        let mut host = DaoHost::new(fixture.config.host.clone(), fixture.registry().unwrap());
        host.apply_all(fixture.events.clone()).await.unwrap();
        let chain = fixture.chain();
        let snapshot = host.snapshot();

        let token_manager = address!("a000000000000000000000000000000000000001");
        let sender = address!("1111111111111111111111111111111111111111");
        let intent = Intent::invoke_str(
            &snapshot.apps,
            token_manager,
            "mint",
            &[sender.to_string(), "1000".into()],
        )
        .unwrap();

        let path = PathResolver::new(&snapshot, &chain, &fixture.config.resolver)
            .resolve(&intent, sender)
            .await
            .unwrap();
        let path = TransactionAssembler::new(&chain, &fixture.config.resolver)
            .assemble(path, &intent)
            .await
            .unwrap();

        assert_eq!(path.hops(), 1);
        assert_eq!(path.transactions[0].to, address!("a000000000000000000000000000000000000002"));
        assert_eq!(path.transactions[0].gas, Some(120_000));
    }
}
