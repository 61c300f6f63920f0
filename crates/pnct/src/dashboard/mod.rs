//! Web dashboard for browsing PNCT tables.
//!
//! Routes:
//! - `GET /` search form, query history, results
//! - `GET /map` Leaflet map of the selected stations
//! - `GET /export` selected rows as CSV
//! - `POST /admin/clear` drop stored tables and history

mod handlers;
pub mod render;

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use crate::error::Result;
use crate::panel::Panel;

/// Build the dashboard router.
pub fn router(panel: Panel) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/map", get(handlers::map_page))
        .route("/export", get(handlers::export))
        .route("/admin/clear", post(handlers::clear))
        .with_state(panel)
}

/// A dashboard running in the background.
#[derive(Debug)]
pub struct DashboardServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl DashboardServer {
    /// Bind `addr` and serve the dashboard on a background task.
    ///
    /// Port 0 picks a free port; see [`DashboardServer::addr`].
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(panel: Panel, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = router(panel);
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// The address the server listens on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL for `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop accepting connections and finish in-flight requests.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Serve the dashboard on `addr` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(panel: Panel, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Dashboard listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(panel))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down dashboard");
        })
        .await?;
    Ok(())
}
