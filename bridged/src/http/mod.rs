pub mod handlers;
mod routes;
pub use routes::build as build_router;

use crate::state::AppState;
use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;

/// Binds, marks the host ready, then serves until ctrl-c.
pub async fn serve(app_state: AppState, bind: SocketAddr) -> Result<()> {
    let host = app_state.host.clone();
    let app: Router = routes::build(app_state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("accessory host listening on http://{}", listener.local_addr()?);
    host.mark_ready();
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
