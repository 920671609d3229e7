use std::{collections::HashSet, future::Future, sync::Arc, time::Duration};

use metrics::counter;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::{
    classifier::Classifier,
    error::BridgeError,
    factory::AccessoryFactory,
    model::{Device, Property},
    reconciler::Reconciler,
    registry::{AccessoryHost, DEFAULT_PLATFORM_ID, DEFAULT_PLUGIN_ID, Registry},
    router::CommandRouter,
    transport::Transport,
};

#[derive(Clone, Debug, PartialEq)]
pub struct BridgeOptions {
    pub plugin_id: String,
    pub platform_id: String,
    /// Upper bound for each of `subscribe` and `get_accessories`.
    pub sync_timeout: Duration,
    pub sync_attempts: u32,
    pub retry_backoff: Duration,
    /// Log every device of the snapshot before classification.
    pub list_devices: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            plugin_id: DEFAULT_PLUGIN_ID.to_string(),
            platform_id: DEFAULT_PLATFORM_ID.to_string(),
            sync_timeout: Duration::from_secs(30),
            sync_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            list_devices: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub registered: usize,
    pub skipped: usize,
    pub pruned: usize,
}

/// Ties the transport, the registry and the host together: cold sync first,
/// then one event at a time until the stream ends.
pub struct Bridge {
    transport: Arc<dyn Transport>,
    host: Arc<dyn AccessoryHost>,
    registry: Arc<Registry>,
    classifier: Classifier,
    factory: AccessoryFactory,
    reconciler: Reconciler,
    options: BridgeOptions,
}

impl Bridge {
    pub fn new(
        transport: Arc<dyn Transport>,
        host: Arc<dyn AccessoryHost>,
        classifier: Classifier,
        options: BridgeOptions,
    ) -> Self {
        let registry = Arc::new(Registry::with_ids(
            Arc::clone(&host),
            options.plugin_id.clone(),
            options.platform_id.clone(),
        ));
        let factory = AccessoryFactory::new(CommandRouter::new(Arc::clone(&transport)));
        let reconciler = Reconciler::new(Arc::clone(&registry));
        Self { transport, host, registry, classifier, factory, reconciler, options }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub async fn run(&self) -> Result<(), BridgeError> {
        self.host.ready().await;
        for accessory in self.host.cached_accessories() {
            self.registry.restore(accessory);
        }
        info!(cached = self.registry.len(), "host ready, starting cold sync");
        let report = self.cold_sync().await?;
        info!(
            registered = report.registered,
            skipped = report.skipped,
            pruned = report.pruned,
            "cold sync complete"
        );
        self.run_events().await
    }

    pub async fn cold_sync(&self) -> Result<SyncReport, BridgeError> {
        let devices = self.fetch_snapshot().await?;
        if self.options.list_devices {
            log_inventory(&devices);
        }

        let mut report = SyncReport::default();
        let mut seen = HashSet::new();
        for device in &devices {
            let Some(recipe) = self.classifier.classify(device) else {
                debug!(uuid = %device.uuid, model = %device.model, "no recipe for device, skipping");
                report.skipped += 1;
                continue;
            };
            let accessory = self.factory.build(device, recipe);
            self.registry.register(accessory);
            info!(uuid = %device.uuid, name = %device.name, model = %device.model, "added accessory");
            seen.insert(device.uuid.clone());
            report.registered += 1;
        }
        report.pruned = self.registry.prune(&seen);
        Ok(report)
    }

    async fn fetch_snapshot(&self) -> Result<Vec<Device>, BridgeError> {
        let attempts = self.options.sync_attempts.max(1);
        let mut backoff = self.options.retry_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_fetch_snapshot().await {
                Ok(devices) => return Ok(devices),
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, "cold sync failed, retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(BridgeError::Sync { attempts: attempt, source: e }),
            }
        }
    }

    async fn try_fetch_snapshot(&self) -> anyhow::Result<Vec<Device>> {
        self.bounded("subscribe", self.transport.subscribe()).await?;
        self.bounded("get_accessories", self.transport.get_accessories()).await
    }

    async fn bounded<T>(
        &self,
        step: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let timeout = self.options.sync_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(BridgeError::Timeout { step, timeout }.into()),
        }
    }

    /// Drains controller events through a single consumer. Returns when the
    /// transport's stream ends.
    pub async fn run_events(&self) -> Result<(), BridgeError> {
        let mut stream = self.transport.get_events().await.map_err(BridgeError::Events)?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        while let Some(event) = rx.recv().await {
            let outcome = self.reconciler.apply(&event);
            counter!("bridge.events.applied").increment(outcome.applied as u64);
            counter!("bridge.events.dropped").increment(outcome.dropped as u64);
        }
        warn!("controller event stream ended");
        Ok(())
    }
}

fn log_inventory(devices: &[Device]) {
    info!(count = devices.len(), "controller inventory");
    for device in devices {
        let properties: Vec<String> = device
            .properties
            .iter()
            .map(|p| match p {
                Property::Status(s) => format!("Status={s:?}"),
                Property::Brightness(b) => format!("Brightness={b:?}"),
                Property::Unknown { key, value } => format!("{key}={value}"),
            })
            .collect();
        info!(
            name = %device.name,
            uuid = %device.uuid,
            device_type = %device.device_type,
            model = %device.model,
            properties = %properties.join(","),
            "device"
        );
    }
}
