pub mod config;
pub mod host;
pub mod http;
pub mod state;
pub mod telemetry;
pub mod wiring;

use anyhow::Context;

use crate::{config::Config, http::serve, telemetry::init_tracing};

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    init_tracing()?;
    let (app_state, bridge) = wiring::build(&cfg).await?;
    tokio::select! {
        res = serve(app_state, cfg.bind) => res,
        res = bridge.run() => res.context("bridge stopped"),
    }
}
