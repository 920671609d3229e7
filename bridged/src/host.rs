use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use bridge_core::{accessory::Accessory, model::DeviceUuid, registry::AccessoryHost};
use tokio::sync::watch;
use tracing::info;

/// Publishes registered accessories over HTTP.
pub struct HttpHost {
    published: RwLock<BTreeMap<DeviceUuid, Arc<Accessory>>>,
    ready: watch::Sender<bool>,
}

impl Default for HttpHost {
    fn default() -> Self {
        let (ready, _rx) = watch::channel(false);
        Self { published: RwLock::new(BTreeMap::new()), ready }
    }
}

impl HttpHost {
    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn list(&self) -> Vec<Arc<Accessory>> {
        self.published.read().unwrap_or_else(PoisonError::into_inner).values().cloned().collect()
    }

    pub fn get(&self, id: &DeviceUuid) -> Option<Arc<Accessory>> {
        self.published.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }
}

#[async_trait]
impl AccessoryHost for HttpHost {
    async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    fn register_accessories(
        &self,
        plugin_id: &str,
        platform_id: &str,
        accessories: &[Arc<Accessory>],
    ) {
        let mut g = self.published.write().unwrap_or_else(PoisonError::into_inner);
        for a in accessories {
            info!(plugin_id, platform_id, uuid = %a.identity, name = %a.display_name, "accessory published");
            g.insert(a.identity.clone(), Arc::clone(a));
        }
    }

    fn unregister_accessories(
        &self,
        plugin_id: &str,
        platform_id: &str,
        accessories: &[Arc<Accessory>],
    ) {
        let mut g = self.published.write().unwrap_or_else(PoisonError::into_inner);
        for a in accessories {
            info!(plugin_id, platform_id, uuid = %a.identity, "accessory withdrawn");
            g.remove(&a.identity);
        }
    }
}
