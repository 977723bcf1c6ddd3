use axum::routing::get;
use axum::{Json, Router};
use fedkit::RemoteManifest;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

pub const REMOTE_ENTRY_PATH: &str = "/remoteEntry.json";

/// Routes published by this remote. Hosts fetch the manifest cross-origin.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route(
            REMOTE_ENTRY_PATH,
            get(|| async { Json::<RemoteManifest>(crate::manifest()) }),
        )
        .layer(CorsLayer::permissive())
}

/// Serve [`router`] on `listener` until `cancel` fires.
///
/// # Errors
/// Returns the I/O error that stopped the server.
pub async fn serve(listener: TcpListener, cancel: CancellationToken) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, path = REMOTE_ENTRY_PATH, "serving remote manifest");
    axum::serve(listener, router())
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    tracing::info!("remote manifest server stopped");
    Ok(())
}
