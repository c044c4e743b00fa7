//! Transaction descriptions handed to an external signer.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// One concrete transaction. A `pretransaction`, if present, must be mined first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStep {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pretransaction: Option<Box<TransactionStep>>,
}

impl TransactionStep {
    pub fn new(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to,
            data: data.into(),
            gas: None,
            pretransaction: None,
        }
    }
}

/// Token amount a step needs the sender to have approved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequirement {
    pub token: Address,
    pub amount: U256,
    /// Defaults to the step's target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spender: Option<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "warning")]
pub enum PathWarning {
    /// Allowance is non-zero but short; some tokens reject approvals unless reset to zero first.
    NonZeroAllowance {
        token: Address,
        spender: Address,
        current: U256,
        required: U256,
    },
}

/// Result of resolving an intent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPath {
    /// Transactions in submission order; entry 0 is sent first.
    pub transactions: Vec<TransactionStep>,
    /// Every call along the route, outermost forwarder first, ending with the intended call.
    pub route: Vec<TransactionStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PathWarning>,
}

impl TransactionPath {
    pub fn direct(step: TransactionStep) -> Self {
        Self {
            transactions: vec![step.clone()],
            route: vec![step],
            warnings: Vec::new(),
        }
    }

    /// Number of forwarders between the sender and the intended call.
    pub fn hops(&self) -> usize {
        self.route.len().saturating_sub(1)
    }

    pub fn is_forwarded(&self) -> bool {
        self.hops() > 0
    }
}
