//! Permissioned transaction path resolution for modular DAOs.
//!
//! Given an intended call and a sender, find out whether the sender may perform it
//! directly or through a chain of forwarders, and describe the transactions an external
//! signer has to submit.

pub mod abi;
pub mod assembler;
pub mod callscript;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod host;
pub mod intent;
pub mod mock;
pub mod permissions;
pub mod resolver;
pub mod retry;
pub mod utils;


pub use assembler::{recommended_gas, TransactionAssembler};
pub use callscript::{decode, encode, Segment};
pub use catalog::AppSet;
pub use config::{Config, HostConfig, ResolverConfig, RpcPolicy};
pub use errors::{PathError, ScriptError};
pub use host::{DaoHost, DaoReader, DaoSnapshot, PermissionSubscription, PermissionUpdate};
pub use intent::Intent;
pub use permissions::{PermissionChange, PermissionEntry, PermissionLog, PermissionState};
pub use resolver::PathResolver;

pub use dao_txpath_types as types;
