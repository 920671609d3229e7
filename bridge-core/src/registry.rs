use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{accessory::Accessory, model::DeviceUuid};

pub const DEFAULT_PLUGIN_ID: &str = "nhc2-bridge";
pub const DEFAULT_PLATFORM_ID: &str = "NHC2";

/// The platform that publishes accessories to end users.
///
/// Register/unregister are called while the registry lock is held, so
/// implementations must not call back into the [`Registry`].
#[async_trait]
pub trait AccessoryHost: Send + Sync {
    /// Resolves once the host has bootstrapped and cold sync may begin.
    async fn ready(&self) {}

    /// Accessories the host kept from a previous run. They are adopted before
    /// cold sync so devices gone from the controller get withdrawn.
    fn cached_accessories(&self) -> Vec<Arc<Accessory>> {
        Vec::new()
    }

    fn register_accessories(
        &self,
        plugin_id: &str,
        platform_id: &str,
        accessories: &[Arc<Accessory>],
    );

    fn unregister_accessories(
        &self,
        plugin_id: &str,
        platform_id: &str,
        accessories: &[Arc<Accessory>],
    );
}

/// Locally known accessories, at most one per identity.
pub struct Registry {
    host: Arc<dyn AccessoryHost>,
    plugin_id: String,
    platform_id: String,
    accessories: Mutex<Vec<Arc<Accessory>>>,
}

impl Registry {
    pub fn new(host: Arc<dyn AccessoryHost>) -> Self {
        Self::with_ids(host, DEFAULT_PLUGIN_ID, DEFAULT_PLATFORM_ID)
    }

    pub fn with_ids(
        host: Arc<dyn AccessoryHost>,
        plugin_id: impl Into<String>,
        platform_id: impl Into<String>,
    ) -> Self {
        Self {
            host,
            plugin_id: plugin_id.into(),
            platform_id: platform_id.into(),
            accessories: Mutex::new(Vec::new()),
        }
    }

    /// Adopts an accessory cached by the host from an earlier run. The host
    /// already knows about it, so it is not notified.
    pub fn restore(&self, accessory: Arc<Accessory>) {
        let mut guard = self.accessories.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.iter().any(|a| a.identity == accessory.identity) {
            debug!(uuid = %accessory.identity, "cached accessory already present, ignoring");
            return;
        }
        debug!(uuid = %accessory.identity, name = %accessory.display_name, "restored cached accessory");
        guard.push(accessory);
    }

    /// Replaces any accessory with the same identity, then publishes.
    pub fn register(&self, accessory: Arc<Accessory>) {
        let mut guard = self.accessories.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = guard.iter().position(|a| a.identity == accessory.identity) {
            let existing = guard.remove(pos);
            debug!(uuid = %existing.identity, "replacing existing accessory");
            self.host.unregister_accessories(&self.plugin_id, &self.platform_id, &[existing]);
        }
        guard.push(Arc::clone(&accessory));
        self.host.register_accessories(&self.plugin_id, &self.platform_id, &[accessory]);
    }

    /// Withdraws the accessory with the same identity, if one is registered.
    pub fn unregister(&self, accessory: &Accessory) -> bool {
        let mut guard = self.accessories.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = guard.iter().position(|a| a.identity == accessory.identity) else {
            debug!(uuid = %accessory.identity, "accessory not registered, nothing to withdraw");
            return false;
        };
        let removed = guard.remove(pos);
        self.host.unregister_accessories(&self.plugin_id, &self.platform_id, &[removed]);
        true
    }

    pub fn find_by_identity(&self, id: &DeviceUuid) -> Option<Arc<Accessory>> {
        let guard = self.accessories.lock().unwrap_or_else(PoisonError::into_inner);
        guard.iter().find(|a| &a.identity == id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<Accessory>> {
        self.accessories.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.accessories.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unregisters every accessory whose identity is not in `keep`.
    pub fn prune(&self, keep: &HashSet<DeviceUuid>) -> usize {
        let mut guard = self.accessories.lock().unwrap_or_else(PoisonError::into_inner);
        let (kept, stale): (Vec<_>, Vec<_>) =
            guard.drain(..).partition(|a| keep.contains(&a.identity));
        *guard = kept;
        if !stale.is_empty() {
            for a in &stale {
                info!(uuid = %a.identity, name = %a.display_name, "device gone from controller");
            }
            self.host.unregister_accessories(&self.plugin_id, &self.platform_id, &stale);
        }
        stale.len()
    }
}
