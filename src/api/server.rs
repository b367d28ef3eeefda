//! API HTTP server.

use super::routes::handle_request;
use crate::state::AppState;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Serves the admin and relay routes over HTTP/1.
pub struct ApiServer {
    listener: TcpListener,
    state: AppState,
}

impl ApiServer {
    /// Bind the listener. Port 0 picks a free port.
    pub async fn bind(address: SocketAddr, state: AppState) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if let Ok(address) = self.local_addr() {
            info!(address = %address, "api server started");
        }

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            let state = self.state.clone();

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let state = state.clone();
                                    async move { handle_request(req, &state).await }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(error = %e, peer = %peer, "api connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept api connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("api server shutting down");
                    break;
                }
            }
        }
    }
}
