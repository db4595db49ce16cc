//! Canopy HTTP server
//!
//! JSON API over the audit pipeline, built on warp.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/test` | Health check |
//! | `POST` | `/api/analyze` | Audit a parcel; mint, update or simulate |
//! | `POST` | `/api/predict` | Fire-risk check for one site |
//! | `POST` | `/api/guardian/scan` | Scan a user's watch-list |
//! | `POST` | `/api/sync` | Resolve PENDING token ids from a transaction |
//! | `GET`  | `/api/audits/{userId}` | A user's audit records |
//! | `GET`  | `/api/watchlist/{userId}` | A user's watch targets |
//! | `POST` | `/api/watchlist` | Add a watch target |
//! | `DELETE` | `/api/watchlist/{id}` | Remove a watch target |
//! | `GET`/`PUT` | `/api/settings/{userId}` | Alert settings |
//! | `GET`  | `/api/evidence/{requestId}/{slot}` | Raw evidence raster |

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod dto;
mod handlers;
mod routes;

pub use routes::{routes, MAX_BODY_BYTES};

use canopy_core::Canopy;
use std::future::Future;
use std::net::SocketAddr;

/// Serve until `shutdown` resolves
///
/// # Errors
/// Returns the bind error when the address is unavailable.
pub async fn serve(
    canopy: Canopy,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), warp::Error> {
    let (bound, server) = warp::serve(routes(canopy)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    tracing::info!(addr = %bound, "canopy server listening");
    server.await;
    tracing::info!("canopy server stopped");
    Ok(())
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
