//! Installed apps keyed by proxy address, and the forwarders among them.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use dao_txpath_types::{App, AppArtifact};

/// Apps in discovery order. Records are superseded, never removed.
#[derive(Clone, Debug, Default)]
pub struct AppSet {
    order: Vec<Address>,
    apps: HashMap<Address, App>,
}

impl AppSet {
    pub fn get(&self, proxy: Address) -> Option<&App> {
        self.apps.get(&proxy)
    }

    pub fn contains(&self, proxy: Address) -> bool {
        self.apps.contains_key(&proxy)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Apps in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &App> {
        self.order.iter().filter_map(|proxy| self.apps.get(proxy))
    }

    /// Forwarders in discovery order, reflecting the latest known record of each app.
    pub fn forwarders(&self) -> impl Iterator<Item = &App> {
        self.iter().filter(|app| app.is_forwarder)
    }

    /// Insert or replace the record for `app.proxy_address`. Returns `true` if new.
    pub fn upsert(&mut self, app: App) -> bool {
        let proxy = app.proxy_address;
        let is_new = self.apps.insert(proxy, app).is_none();
        if is_new {
            self.order.push(proxy);
        }
        is_new
    }

    /// Point every app with `app_id` at new code. Returns the affected proxies.
    pub fn set_base(&mut self, app_id: B256, code_address: Address, artifact: AppArtifact) -> Vec<Address> {
        let artifact = Arc::new(artifact);
        let is_forwarder = artifact.is_forwarder();
        let mut updated = Vec::new();
        for proxy in &self.order {
            if let Some(app) = self.apps.get_mut(proxy) {
                if app.app_id == app_id {
                    app.code_address = code_address;
                    app.artifact = Arc::clone(&artifact);
                    app.is_forwarder = is_forwarder;
                    updated.push(*proxy);
                }
            }
        }
        updated
    }
}
