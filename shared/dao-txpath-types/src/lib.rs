//! Shared types for DAO transaction path resolution.
//!
//! Used by the resolver library and by off-chain tooling, so the data model and the
//! collaborator traits live in one place.

pub mod app;
pub mod constants;
pub mod events;
pub mod query;
pub mod transaction;

pub use app::{App, AppArtifact, ArtifactError, ArtifactManifest, MethodDescriptor, MethodKind, RoleDescriptor};
pub use constants::{Namespace, ANY_ENTITY, CALLSCRIPT_SPEC_ID, FORWARD_SIGNATURE};
pub use events::{ChainEvent, EventKind, LogPosition};
pub use query::{AppRegistry, ChainQuery, ForwardFee, ProxyInfo, QueryError};
pub use transaction::{PathWarning, TokenRequirement, TransactionPath, TransactionStep};
