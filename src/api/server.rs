use crate::api::{routes, ApiState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Starts and runs the HTTP server using Axum web framework
///
/// # Arguments
/// * `port` - Port number to listen on for incoming HTTP connections
/// * `state` - State shared by the handlers
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Ok when the server stops, Error if it cannot start
pub async fn launch_server(
    port: u16,
    state: Arc<ApiState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = routes::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
