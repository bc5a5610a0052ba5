use std::net::SocketAddr;

use axum::Router;
use log::info;
use tokio::net::TcpListener;
use tokio::signal;

use crate::errors::RelayError;

/// Serve the given router until ctrl-c
pub async fn serve(router: Router, addr: SocketAddr) -> Result<(), RelayError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Relay listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
