use std::sync::Arc;

use adapter_nhc2::Nhc2Transport;
use anyhow::Result;
use bridge_core::{bridge::Bridge, classifier::Classifier, transport::Transport};

use crate::{config::Config, host::HttpHost, state::AppState};

pub async fn build(cfg: &Config) -> Result<(AppState, Bridge)> {
    let host = Arc::new(HttpHost::default());
    let transport: Arc<dyn Transport> = Arc::new(Nhc2Transport::connect(&cfg.nhc2).await?);
    tracing::info!(host = %cfg.nhc2.host, port = cfg.nhc2.port, tls = cfg.nhc2.tls, "controller transport ready");
    let bridge = Bridge::new(transport, host.clone(), Classifier::default(), cfg.bridge.clone());
    Ok((AppState { host }, bridge))
}
