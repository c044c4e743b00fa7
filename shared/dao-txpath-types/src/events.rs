//! Kernel and ACL events consumed by the permission projection and the app catalog.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Position of a log in the chain; orders events deterministically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl LogPosition {
    pub const fn new(block_number: u64, log_index: u64) -> Self {
        Self { block_number, log_index }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum EventKind {
    /// ACL `SetPermission(entity, app, role, allowed)`.
    SetPermission {
        app: Address,
        role: B256,
        entity: Address,
        allowed: bool,
    },
    /// ACL `ChangePermissionManager(app, role, manager)`.
    ChangePermissionManager {
        app: Address,
        role: B256,
        manager: Address,
    },
    /// Kernel `SetApp(namespace, appId, app)`.
    SetApp {
        namespace: B256,
        #[serde(rename = "appId")]
        app_id: B256,
        app: Address,
    },
}

impl EventKind {
    /// The app an ACL event refers to.
    pub fn permission_app(&self) -> Option<Address> {
        match self {
            EventKind::SetPermission { app, .. } | EventKind::ChangePermissionManager { app, .. } => Some(*app),
            EventKind::SetApp { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    #[serde(flatten)]
    pub position: LogPosition,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ChainEvent {
    pub fn new(position: LogPosition, kind: EventKind) -> Self {
        Self { position, kind }
    }
}
