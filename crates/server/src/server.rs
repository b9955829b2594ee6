use std::net::SocketAddr;

use axum::{Router, routing::get};
use tokio::net::TcpListener;

async fn health() -> &'static str {
    "OK"
}

fn router() -> Router {
    Router::new().route("/", get(health))
}

/// Bind `bind:port` and serve until the process ends.
pub async fn run(bind: &str, port: u16) {
    let listener = match TcpListener::bind((bind, port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener on {bind}:{port}: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(listener: TcpListener) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router()).await
}

pub fn spawn_with_listener(listener: TcpListener) -> Result<SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}
