//! Single-writer host for the permission projection and the app catalog.
//!
//! `DaoHost` is the only writer: it folds chain events, discovers apps through the
//! registry and publishes an immutable [`DaoSnapshot`] after every event. Readers hold a
//! [`DaoReader`] and never observe a half-applied event.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use dao_txpath_types::{App, AppRegistry, ChainEvent, EventKind, LogPosition, Namespace, QueryError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::{
    catalog::AppSet,
    config::HostConfig,
    errors::PathError,
    permissions::{Insertion, PermissionChange, PermissionLog, PermissionState},
    retry::{with_retry, Exhausted},
};

/// Consistent view of permissions and apps at one revision.
#[derive(Clone, Debug, Default)]
pub struct DaoSnapshot {
    pub permissions: Arc<PermissionState>,
    pub apps: Arc<AppSet>,
    /// Incremented on every publish.
    pub revision: u64,
    /// Latest ACL log position folded in.
    pub head: Option<LogPosition>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PermissionUpdate {
    Changed {
        revision: u64,
        position: LogPosition,
        change: PermissionChange,
    },
    /// The state was rebuilt (late event re-ordered into the log, or the subscriber lagged).
    Reset {
        revision: u64,
        state: Arc<PermissionState>,
    },
}

impl PermissionUpdate {
    pub fn revision(&self) -> u64 {
        match self {
            PermissionUpdate::Changed { revision, .. } | PermissionUpdate::Reset { revision, .. } => *revision,
        }
    }
}

enum Delta {
    Unchanged,
    Changed(LogPosition, PermissionChange),
    Reset,
}

pub struct DaoHost<R> {
    config: HostConfig,
    registry: R,
    log: PermissionLog,
    permissions: Arc<PermissionState>,
    apps: Arc<AppSet>,
    /// Position of the last applied `SetApp` in the base namespace, per app id.
    base_heads: HashMap<B256, LogPosition>,
    revision: u64,
    snapshots: watch::Sender<DaoSnapshot>,
    updates: broadcast::Sender<PermissionUpdate>,
}

impl<R: AppRegistry> DaoHost<R> {
    pub fn new(config: HostConfig, registry: R) -> Self {
        let (snapshots, _) = watch::channel(DaoSnapshot::default());
        let (updates, _) = broadcast::channel(config.update_capacity.max(1));
        Self {
            config,
            registry,
            log: PermissionLog::default(),
            permissions: Arc::default(),
            apps: Arc::default(),
            base_heads: HashMap::new(),
            revision: 0,
            snapshots,
            updates,
        }
    }

    pub fn reader(&self) -> DaoReader {
        DaoReader {
            snapshots: self.snapshots.subscribe(),
            updates: self.updates.clone(),
        }
    }

    pub fn snapshot(&self) -> DaoSnapshot {
        self.snapshots.borrow().clone()
    }

    pub async fn apply_all(&mut self, events: impl IntoIterator<Item = ChainEvent>) -> Result<(), PathError> {
        for event in events {
            self.apply(event).await?;
        }
        Ok(())
    }

    /// Fold one event and publish the result.
    ///
    /// Permission changes are published even when app discovery for the event fails;
    /// the discovery error is returned afterwards.
    pub async fn apply(&mut self, event: ChainEvent) -> Result<(), PathError> {
        match event.kind {
            EventKind::SetApp { namespace, app_id, app } => {
                let result = self.apply_set_app(event.position, namespace, app_id, app).await;
                self.publish(Delta::Unchanged);
                result
            }
            EventKind::SetPermission { app, .. } | EventKind::ChangePermissionManager { app, .. } => {
                let delta = match self.log.insert(event.clone()) {
                    Insertion::Duplicate => {
                        debug!(position = ?event.position, "duplicate ACL event ignored");
                        return Ok(());
                    }
                    Insertion::Appended => match Arc::make_mut(&mut self.permissions).apply(&event.kind) {
                        Some(change) => Delta::Changed(event.position, change),
                        None => Delta::Unchanged,
                    },
                    Insertion::Reordered => {
                        warn!(position = ?event.position, head = ?self.log.head(), "late ACL event, refolding permissions");
                        self.permissions = Arc::new(self.log.fold());
                        Delta::Reset
                    }
                };
                let discovered = self.discover(app).await;
                self.publish(delta);
                discovered
            }
        }
    }

    async fn apply_set_app(
        &mut self,
        position: LogPosition,
        namespace: B256,
        app_id: B256,
        app: Address,
    ) -> Result<(), PathError> {
        match Namespace::classify(namespace) {
            Namespace::App => self.discover(app).await,
            Namespace::AppBase => self.set_base(position, app_id, app).await,
            ns => {
                debug!(?ns, %app_id, "SetApp outside app namespaces ignored");
                Ok(())
            }
        }
    }

    async fn set_base(&mut self, position: LogPosition, app_id: B256, code_address: Address) -> Result<(), PathError> {
        if self.base_heads.get(&app_id).is_some_and(|head| *head >= position) {
            debug!(%app_id, ?position, "stale SetApp ignored");
            return Ok(());
        }
        if !self.apps.iter().any(|app| app.app_id == app_id) {
            // Instances discovered later read their current code from the registry.
            self.base_heads.insert(app_id, position);
            return Ok(());
        }

        let registry = &self.registry;
        let artifact = with_retry(&self.config.rpc, "artifact", || registry.artifact(app_id, code_address)).await?;
        let updated = Arc::make_mut(&mut self.apps).set_base(app_id, code_address, artifact);
        self.base_heads.insert(app_id, position);
        info!(%app_id, %code_address, instances = updated.len(), "app code upgraded");
        Ok(())
    }

    /// Add `proxy` to the catalog if it is a new app.
    async fn discover(&mut self, proxy: Address) -> Result<(), PathError> {
        if self.config.kernel == Some(proxy) || self.apps.contains(proxy) {
            return Ok(());
        }

        let registry = &self.registry;
        let policy = &self.config.rpc;
        let info = match with_retry(policy, "proxyInfo", || registry.proxy_info(proxy)).await {
            Ok(info) => info,
            Err(Exhausted {
                error: QueryError::NotImplemented | QueryError::Reverted(_),
                ..
            }) => {
                debug!(%proxy, "not an app proxy");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let artifact = with_retry(policy, "artifact", || registry.artifact(info.app_id, info.code_address)).await?;

        let app = App::new(proxy, info.app_id, info.code_address, artifact);
        info!(%proxy, app_id = %info.app_id, forwarder = app.is_forwarder, "discovered app");
        Arc::make_mut(&mut self.apps).upsert(app);
        Ok(())
    }

    fn publish(&mut self, delta: Delta) {
        self.revision += 1;
        let revision = self.revision;
        self.snapshots.send_replace(DaoSnapshot {
            permissions: Arc::clone(&self.permissions),
            apps: Arc::clone(&self.apps),
            revision,
            head: self.log.head(),
        });

        let update = match delta {
            Delta::Unchanged => return,
            Delta::Changed(position, change) => PermissionUpdate::Changed {
                revision,
                position,
                change,
            },
            Delta::Reset => PermissionUpdate::Reset {
                revision,
                state: Arc::clone(&self.permissions),
            },
        };
        // No subscribers is fine.
        let _ = self.updates.send(update);
    }
}

/// Cloneable read handle on a [`DaoHost`].
#[derive(Clone)]
pub struct DaoReader {
    snapshots: watch::Receiver<DaoSnapshot>,
    updates: broadcast::Sender<PermissionUpdate>,
}

impl DaoReader {
    /// Atomic snapshot of the latest published state.
    pub fn snapshot(&self) -> DaoSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait for the next publish. Returns `false` once the host is gone.
    pub async fn changed(&mut self) -> bool {
        self.snapshots.changed().await.is_ok()
    }

    /// Current permission state plus every later update.
    pub fn subscribe(&self) -> PermissionSubscription {
        // Subscribe before reading the snapshot so no update falls between the two;
        // updates already contained in the snapshot are skipped by revision.
        let updates = self.updates.subscribe();
        let snapshot = self.snapshot();
        PermissionSubscription {
            state: snapshot.permissions,
            revision: snapshot.revision,
            updates,
            snapshots: self.snapshots.clone(),
        }
    }
}

pub struct PermissionSubscription {
    state: Arc<PermissionState>,
    revision: u64,
    updates: broadcast::Receiver<PermissionUpdate>,
    snapshots: watch::Receiver<DaoSnapshot>,
}

impl PermissionSubscription {
    /// State at the time of subscribing.
    pub fn initial(&self) -> &Arc<PermissionState> {
        &self.state
    }

    /// Revision of the last state this subscriber has seen.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub async fn next(&mut self) -> Option<PermissionUpdate> {
        loop {
            match self.updates.recv().await {
                Ok(update) if update.revision() <= self.revision => continue,
                Ok(update) => {
                    self.revision = update.revision();
                    return Some(update);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "permission subscriber lagged, resetting");
                    let snapshot = self.snapshots.borrow().clone();
                    if snapshot.revision <= self.revision {
                        continue;
                    }
                    self.revision = snapshot.revision;
                    return Some(PermissionUpdate::Reset {
                        revision: snapshot.revision,
                        state: snapshot.permissions,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
