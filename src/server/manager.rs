//! Accept loop with a pollable shutdown flag, grounded on the original
//! `nuggserv/serv/manager.go` and adapted to add mutual-TLS handshaking
//! per connection before handing off to [`Duplex`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::provider::DataSourceSink;
use crate::server::Duplex;

/// How often the accept loop wakes to re-check `should_run`, matching
/// spec.md §5's "short accept deadline" shutdown mechanism.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Owns the listening socket and spawns one [`Duplex`] task per accepted,
/// TLS-handshaken connection.
pub struct Manager {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    provider: Arc<dyn DataSourceSink>,
    should_run: Arc<AtomicBool>,
}

impl Manager {
    pub fn new(listener: TcpListener, tls_config: rustls::ServerConfig, provider: Arc<dyn DataSourceSink>) -> Self {
        Manager {
            listener,
            acceptor: TlsAcceptor::from(Arc::new(tls_config)),
            provider,
            should_run: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A handle that [`Manager::serve`] polls; clear it to start a
    /// graceful shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.should_run.clone()
    }

    /// Runs the accept loop until the shutdown handle is cleared. Each
    /// accepted connection is handshaken and dispatched on its own task;
    /// a handshake or dispatch failure on one connection never affects
    /// the loop itself.
    pub async fn serve(&self) {
        info!("accept loop starting");
        while self.should_run.load(Ordering::Relaxed) {
            let accepted = tokio::time::timeout(ACCEPT_POLL_INTERVAL, self.listener.accept()).await;
            let (socket, peer) = match accepted {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    warn!(%e, "accept failed");
                    continue;
                }
                Err(_elapsed) => continue,
            };

            let acceptor = self.acceptor.clone();
            let provider = self.provider.clone();
            tokio::spawn(async move {
                match acceptor.accept(socket).await {
                    Ok(tls_stream) => {
                        info!(%peer, "connection established");
                        Duplex::new(tls_stream, provider).run().await;
                        info!(%peer, "connection closed");
                    }
                    Err(e) => warn!(%peer, %e, "tls handshake failed"),
                }
            });
        }
        info!("accept loop stopped");
    }
}
