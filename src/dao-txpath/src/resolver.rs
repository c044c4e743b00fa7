//! Forwarder path search.
//!
//! A sender without the role an intent requires may still reach the target through
//! forwarders: apps that relay a callscript for entities they trust. The search is
//! breadth-first over the forwarder catalog, so the shortest chain wins, and ties are
//! broken by catalog (discovery) order.

use std::collections::HashSet;

use alloy_primitives::{Address, Bytes};
use dao_txpath_types::{App, ChainQuery, QueryError, TransactionPath, TransactionStep};
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::{
    abi::forward_call_data,
    callscript::{encode, Segment},
    config::ResolverConfig,
    errors::PathError,
    host::DaoSnapshot,
    intent::Intent,
    retry::{with_retry, Exhausted},
};

/// Calls from the outermost forwarder down to the intended call.
#[derive(Clone, Debug)]
struct Route {
    calls: Vec<TransactionStep>,
    /// Callscript the head forwarder is asked to run.
    script: Bytes,
}

impl Route {
    fn head(&self) -> Address {
        self.calls[0].to
    }

    /// Wrap `calls` behind `forwarder`; the old head is now sent by the forwarder.
    fn wrap(forwarder: Address, calls: &[TransactionStep]) -> Result<Self, PathError> {
        let mut calls = calls.to_vec();
        calls[0].from = forwarder;
        let script = encode(&[Segment::new(calls[0].to, calls[0].data.clone())])?;
        let mut route = Vec::with_capacity(calls.len() + 1);
        route.push(TransactionStep::new(Address::ZERO, forwarder, forward_call_data(&script)));
        route.extend(calls);
        Ok(Self { calls: route, script })
    }

    fn into_path(mut self, sender: Address) -> TransactionPath {
        self.calls[0].from = sender;
        TransactionPath {
            transactions: vec![self.calls[0].clone()],
            route: self.calls,
            warnings: Vec::new(),
        }
    }
}

/// Resolves intents against one snapshot. Never mutates shared state, so a resolution
/// can be dropped at any await point.
pub struct PathResolver<'a, Q: ?Sized> {
    snapshot: &'a DaoSnapshot,
    chain: &'a Q,
    config: &'a ResolverConfig,
}

impl<'a, Q: ChainQuery + ?Sized> PathResolver<'a, Q> {
    pub fn new(snapshot: &'a DaoSnapshot, chain: &'a Q, config: &'a ResolverConfig) -> Self {
        Self { snapshot, chain, config }
    }

    pub async fn resolve(&self, intent: &Intent, sender: Address) -> Result<TransactionPath, PathError> {
        let direct = TransactionStep::new(sender, intent.to, intent.call_data()?);
        let target = intent.to;

        let Some(role) = intent.method.required_role() else {
            debug!(%target, method = %intent.method.signature, "method is unguarded");
            return Ok(TransactionPath::direct(direct));
        };

        let entry = self.snapshot.permissions.entry(target, role);
        if entry.allows(sender) {
            debug!(%sender, %target, "sender holds the role");
            return Ok(TransactionPath::direct(direct));
        }

        let forwarders: Vec<&App> = self.snapshot.apps.forwarders().collect();

        // The target never relays to itself; every forwarder enters the search once.
        let mut visited: HashSet<Address> = HashSet::from([target]);
        let mut frontier: Vec<Route> = Vec::new();
        for forwarder in &forwarders {
            if entry.allows(forwarder.proxy_address) && visited.insert(forwarder.proxy_address) {
                frontier.push(Route::wrap(forwarder.proxy_address, std::slice::from_ref(&direct))?);
            }
        }

        let mut depth = 0usize;
        while !frontier.is_empty() && depth < self.config.max_hops {
            depth += 1;

            let accepted = self
                .check_all(frontier.iter().map(|route| (route.head(), sender, &route.script[..])))
                .await?;
            if let Some(i) = accepted.iter().position(|ok| *ok) {
                let path = frontier.swap_remove(i).into_path(sender);
                info!(%sender, %target, hops = path.hops(), forwarder = %path.transactions[0].to, "forwarding path found");
                return Ok(path);
            }

            frontier = self.expand(&frontier, &forwarders, &mut visited).await?;
            debug!(depth, next = frontier.len(), "expanding forwarder search");
        }

        info!(%sender, %target, depth, "no forwarding path");
        Err(PathError::NoPermission { sender, target, depth })
    }

    /// Next level: unvisited forwarders that the head of a route accepts as its caller.
    async fn expand(
        &self,
        frontier: &[Route],
        forwarders: &[&App],
        visited: &mut HashSet<Address>,
    ) -> Result<Vec<Route>, PathError> {
        let mut candidates: Vec<(usize, Address)> = Vec::new();
        for (i, route) in frontier.iter().enumerate() {
            for forwarder in forwarders {
                let forwarder = forwarder.proxy_address;
                if forwarder != route.head() && !visited.contains(&forwarder) {
                    candidates.push((i, forwarder));
                }
            }
        }

        let accepted = self
            .check_all(
                candidates
                    .iter()
                    .map(|&(i, forwarder)| (frontier[i].head(), forwarder, &frontier[i].script[..])),
            )
            .await?;

        let mut next = Vec::new();
        for ((i, forwarder), ok) in candidates.into_iter().zip(accepted) {
            if ok && visited.insert(forwarder) {
                next.push(Route::wrap(forwarder, &frontier[i].calls)?);
            }
        }
        Ok(next)
    }

    /// Run capability checks with bounded concurrency, results in input order.
    async fn check_all<'s>(
        &self,
        checks: impl Iterator<Item = (Address, Address, &'s [u8])>,
    ) -> Result<Vec<bool>, PathError> {
        let results: Vec<Result<bool, PathError>> = stream::iter(checks)
            .map(|(forwarder, sender, script)| self.can_forward(forwarder, sender, script))
            .buffered(self.config.max_concurrent_queries.max(1))
            .collect()
            .await;
        results.into_iter().collect()
    }

    /// Whether `forwarder` will run `script` when called by `sender`.
    ///
    /// Uses the forwarder's own capability query; forwarders without one fall back to
    /// the ACL role guarding their `forward` method.
    async fn can_forward(&self, forwarder: Address, sender: Address, script: &[u8]) -> Result<bool, PathError> {
        match with_retry(&self.config.rpc, "canForward", || self.chain.can_forward(forwarder, sender, script)).await {
            Ok(ok) => Ok(ok),
            Err(Exhausted { error: QueryError::Reverted(reason), .. }) => {
                debug!(%forwarder, %sender, %reason, "canForward reverted");
                Ok(false)
            }
            Err(Exhausted { error: QueryError::NotImplemented, .. }) => Ok(self.forward_role_allows(forwarder, sender)),
            Err(e) => Err(e.into()),
        }
    }

    fn forward_role_allows(&self, forwarder: Address, sender: Address) -> bool {
        self.snapshot
            .apps
            .get(forwarder)
            .and_then(|app| app.artifact.forward_method())
            .and_then(|method| method.required_role())
            .is_some_and(|role| self.snapshot.permissions.allows(forwarder, role, sender))
    }
}
