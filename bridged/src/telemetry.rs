use anyhow::Result;
use tracing_subscriber::{filter::EnvFilter, fmt};

pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("init tracing: {e}"))?;
    Ok(())
}
