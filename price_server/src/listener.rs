use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use price_common::Result;

use crate::broadcaster::Broadcaster;
use crate::connection::serve_connection;
use crate::registry::SubscriptionRegistry;

/// TCP listener accepting price stream subscribers.
///
/// Each accepted socket is served on its own thread by
/// [`serve_connection`]. A failing connection never affects the others or the
/// accept loop.
pub struct StreamListener {
    listener: TcpListener,
    broadcaster: Arc<Broadcaster>,
    registry: Arc<SubscriptionRegistry>,
    next_id: AtomicU64,
    write_timeout: Duration,
}

impl StreamListener {
    /// Bind to `bind_addr` (e.g., `0.0.0.0:8080`).
    pub fn bind(
        bind_addr: &str,
        broadcaster: Arc<Broadcaster>,
        registry: Arc<SubscriptionRegistry>,
        write_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)?;
        Ok(Self {
            listener,
            broadcaster,
            registry,
            next_id: AtomicU64::new(1),
            write_timeout,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Blocking accept loop.
    pub fn run(&self) -> Result<()> {
        info!("Price stream server is started on {}", self.local_addr()?);

        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    error!("TCP connection error: {}", e);
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to disable Nagle: {}", e);
            }

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            debug!(
                "Accepted connection {} ({} already open)",
                id,
                self.broadcaster.connection_count().unwrap_or_default()
            );
            let broadcaster = Arc::clone(&self.broadcaster);
            let registry = Arc::clone(&self.registry);
            let write_timeout = self.write_timeout;
            let spawned = thread::Builder::new()
                .name(format!("conn-{}-reader", id))
                .spawn(move || {
                    if let Err(e) =
                        serve_connection(stream, id, broadcaster, registry, write_timeout)
                    {
                        warn!("Connection {} ended with error: {}", id, e);
                    }
                });
            if let Err(e) = spawned {
                error!("Failed to spawn handler for connection {}: {}", id, e);
            }
        }
        Ok(())
    }
}
