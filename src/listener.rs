use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use tarpc::server::{BaseChannel, Channel};
use tarpc::tokio_serde::formats::Json;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::admission::ConnectionTracker;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::service::KvService;
use crate::shared_types::KeyValueStore;
use crate::store::Store;

/// A running server. Dropping the handle stops it.
pub struct KvServer {
    local_addr: SocketAddr,
    store: Arc<Store>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl KvServer {
    /// Creates a fresh store and starts serving it on the configured address.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let store = Arc::new(Store::new(config.wait_policy()));

        // JSON transport is provided by the json_transport tarpc module.
        let mut listener =
            tarpc::serde_transport::tcp::listen(config.addr(), Json::default).await?;
        listener.config_mut().max_frame_length(usize::MAX);
        let local_addr = listener.local_addr();
        info!(%local_addr, max_connections = config.max_connections, "Server listening");

        let tracker = ConnectionTracker::new(config.max_connections_per_ip, config.max_connections);
        let service = KvService::new(store.clone());
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            tokio::pin!(listener);
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                    accepted = listener.next() => match accepted {
                        Some(Ok(transport)) => {
                            let channel = BaseChannel::with_defaults(transport);
                            let peer = match channel.transport().peer_addr() {
                                Ok(peer) => peer,
                                Err(err) => {
                                    warn!(%err, "Peer address unavailable");
                                    continue;
                                }
                            };
                            let Some(permit) = tracker.try_acquire(peer.ip()) else {
                                continue;
                            };
                            info!(%peer, active = tracker.active(), "New connection");

                            let serve = channel.execute(service.clone().serve());
                            connections.spawn(async move {
                                serve.await;
                                info!(peer = %permit.ip(), "Client disconnected");
                            });
                        }
                        Some(Err(err)) => warn!(%err, "Accept failed"),
                        None => break,
                    }
                }
            }

            info!(active = connections.len(), "Server stopping");
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        });

        Ok(Self {
            local_addr,
            store,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Serves until the accept loop ends. A tcp listener does not end on its
    /// own, so this blocks for the life of the process; use
    /// [`KvServer::run_until`] or [`KvServer::shutdown`] to stop the server.
    pub async fn wait(self) {
        let KvServer { shutdown, task, .. } = self;
        if let Err(err) = task.await {
            error!(%err, "Server task failed");
        }
        drop(shutdown);
    }

    /// Serves until `signal` completes, then shuts down.
    pub async fn run_until(self, signal: impl Future) {
        signal.await;
        self.shutdown().await;
    }

    /// Stops accepting and aborts open connections.
    pub async fn shutdown(self) {
        let KvServer { shutdown, task, .. } = self;
        let _ = shutdown.send(());
        if let Err(err) = task.await {
            error!(%err, "Server task failed");
        }
        info!("Server shutdown complete");
    }
}
