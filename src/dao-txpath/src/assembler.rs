//! Turns a resolved path into submittable transactions: token approvals the path
//! depends on are staged as pretransactions, and every step gets a gas limit.

use dao_txpath_types::{
    ChainQuery, ForwardFee, PathWarning, QueryError, TokenRequirement, TransactionPath, TransactionStep,
};
use futures::try_join;
use tracing::{debug, info, warn};

use crate::{
    abi::approve_call_data,
    config::ResolverConfig,
    errors::PathError,
    intent::Intent,
    retry::{with_retry, Exhausted},
};

/// Gas limit to ask for, given an estimate and the latest block gas limit.
///
/// The estimate is padded by `fuzz_factor` and capped at `block_ratio` of the block
/// limit. An estimate already above the cap passes through unchanged, so the network
/// rejects it instead of the transaction running out of gas.
pub fn recommended_gas(estimated: u64, block_gas_limit: u64, fuzz_factor: f64, block_ratio: f64) -> u64 {
    let cap = (block_gas_limit as f64 * block_ratio).round() as u64;
    if estimated > cap {
        return estimated;
    }
    let padded = (estimated as f64 * fuzz_factor).round() as u64;
    padded.min(cap)
}

pub struct TransactionAssembler<'a, Q: ?Sized> {
    chain: &'a Q,
    config: &'a ResolverConfig,
}

impl<'a, Q: ChainQuery + ?Sized> TransactionAssembler<'a, Q> {
    pub fn new(chain: &'a Q, config: &'a ResolverConfig) -> Self {
        Self { chain, config }
    }

    pub async fn assemble(&self, mut path: TransactionPath, intent: &Intent) -> Result<TransactionPath, PathError> {
        let block_gas_limit = self
            .query("latestBlockGasLimit", || self.chain.latest_block_gas_limit())
            .await?;

        let mut transactions = Vec::with_capacity(path.transactions.len());
        for step in std::mem::take(&mut path.transactions) {
            let step = match self.requirement(&step, &path, intent).await? {
                Some(requirement) => self.stage(step, requirement, &mut path.warnings).await?,
                None => step,
            };
            transactions.push(self.size(step, block_gas_limit).await?);
        }
        path.transactions = transactions;
        Ok(path)
    }

    /// Token approval `step` depends on: the intent's own token use for direct calls,
    /// the forwarding fee for forwarded ones.
    async fn requirement(
        &self,
        step: &TransactionStep,
        path: &TransactionPath,
        intent: &Intent,
    ) -> Result<Option<TokenRequirement>, PathError> {
        if !path.is_forwarded() {
            return Ok(intent.token.map(|t| TokenRequirement {
                spender: Some(t.spender.unwrap_or(step.to)),
                ..t
            }));
        }

        let fee = match with_retry(&self.config.rpc, "forwardFee", || self.chain.forward_fee(step.to)).await {
            Ok(fee) => fee,
            Err(Exhausted {
                error: QueryError::NotImplemented | QueryError::Reverted(_),
                ..
            }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let ForwardFee { token, amount } = fee;
        if amount.is_zero() {
            return Ok(None);
        }
        debug!(forwarder = %step.to, %token, %amount, "forwarder charges a fee");
        Ok(Some(TokenRequirement {
            token,
            amount,
            spender: Some(step.to),
        }))
    }

    /// Check balance and allowance; attach an `approve` pretransaction if needed.
    async fn stage(
        &self,
        mut step: TransactionStep,
        requirement: TokenRequirement,
        warnings: &mut Vec<PathWarning>,
    ) -> Result<TransactionStep, PathError> {
        let TokenRequirement { token, amount, spender } = requirement;
        let owner = step.from;
        let spender = spender.unwrap_or(step.to);

        let (balance, allowance) = try_join!(
            self.query("balanceOf", || self.chain.balance_of(token, owner)),
            self.query("allowance", || self.chain.allowance(token, owner, spender)),
        )?;

        if balance < amount {
            return Err(PathError::InsufficientBalance {
                token,
                required: amount,
                available: balance,
            });
        }
        if allowance >= amount {
            return Ok(step);
        }

        if !allowance.is_zero() {
            warn!(
                %owner, %spender, %token, %allowance, %amount,
                "existing allowance is short; some tokens require resetting it to zero before approving"
            );
            warnings.push(PathWarning::NonZeroAllowance {
                token,
                spender,
                current: allowance,
                required: amount,
            });
        }

        info!(%owner, %spender, %token, %amount, "approve pretransaction required");
        step.pretransaction = Some(Box::new(TransactionStep::new(
            owner,
            token,
            approve_call_data(spender, amount),
        )));
        Ok(step)
    }

    /// Gas for `step` and its pretransaction. A step waiting on a pretransaction cannot be
    /// estimated before the approval is mined, so it is left for the signer to estimate.
    async fn size(&self, mut step: TransactionStep, block_gas_limit: u64) -> Result<TransactionStep, PathError> {
        match step.pretransaction.take() {
            Some(pre) => {
                let pre = self.with_gas(*pre, block_gas_limit).await?;
                step.pretransaction = Some(Box::new(pre));
                Ok(step)
            }
            None => self.with_gas(step, block_gas_limit).await,
        }
    }

    async fn with_gas(&self, mut step: TransactionStep, block_gas_limit: u64) -> Result<TransactionStep, PathError> {
        let estimated = self.query("estimateGas", || self.chain.estimate_gas(&step)).await?;
        step.gas = Some(recommended_gas(
            estimated,
            block_gas_limit,
            self.config.gas_fuzz_factor,
            self.config.block_gas_limit_ratio,
        ));
        Ok(step)
    }

    async fn query<T, F, Fut>(&self, name: &'static str, op: F) -> Result<T, PathError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, QueryError>>,
    {
        with_retry(&self.config.rpc, name, op).await.map_err(PathError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_estimate_by_fuzz_factor() {
        assert_eq!(recommended_gas(100_000, 10_000_000, 1.5, 0.95), 150_000);
    }

    #[test]
    fn caps_at_block_ratio() {
        // 1.5 * 7M exceeds 95% of 10M
        assert_eq!(recommended_gas(7_000_000, 10_000_000, 1.5, 0.95), 9_500_000);
    }

    #[test]
    fn estimate_above_cap_passes_through() {
        assert_eq!(recommended_gas(9_800_000, 10_000_000, 1.5, 0.95), 9_800_000);
    }

    #[test]
    fn estimate_at_cap_is_capped() {
        assert_eq!(recommended_gas(9_500_000, 10_000_000, 1.5, 0.95), 9_500_000);
    }
}
