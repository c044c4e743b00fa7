use alloy_primitives::{Address, U256};
use dao_txpath_types::ArtifactError;
use thiserror::Error;

/// Malformed callscript.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script shorter than the spec id")]
    MissingSpecId,
    #[error("unknown callscript spec id {0:02x?}")]
    InvalidSpecId([u8; 4]),
    #[error("truncated segment header at byte {offset}")]
    TruncatedSegment { offset: usize },
    #[error("segment at byte {offset} declares {declared} data bytes, {available} available")]
    LengthOverrun { offset: usize, declared: usize, available: usize },
    #[error("segment {index} carries {len} data bytes, more than a 4-byte length can declare")]
    SegmentTooLong { index: usize, len: usize },
}

/// Errors surfaced by resolution and assembly.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("invalid callscript: {0}")]
    InvalidScript(#[from] ScriptError),

    #[error("no permission path for {sender} to call {target} (searched {depth} hop(s))")]
    NoPermission {
        sender: Address,
        target: Address,
        depth: usize,
    },

    #[error("{query} query failed: {reason}")]
    Rpc { query: &'static str, reason: String },

    #[error("{query} query timed out after {attempts} attempt(s)")]
    RpcTimeout { query: &'static str, attempts: u32 },

    #[error("insufficient {token} balance: {available} available, {required} required")]
    InsufficientBalance {
        token: Address,
        required: U256,
        available: U256,
    },

    #[error("unknown app {0}")]
    UnknownApp(Address),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("invalid parameters for {method}: {reason}")]
    InvalidParams { method: String, reason: String },
}
