//! Failover connection establishment.
//!
//! Candidate addresses are attempted strictly in order; failure surfaces
//! only after every candidate is exhausted. Sequential failover across a
//! host's A records is the resilience mechanism for multi-homed hosts.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::lookup_host;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Observer for connection-establishment progress.
///
/// `on_connected` fires once TCP connect succeeds, before the connection is
/// handed onward; `on_attempt_failed` fires per failed candidate.
pub trait ConnectListener: Send + Sync {
    fn on_attempt_failed(&self, addr: SocketAddr, error: &io::Error) {
        let _ = (addr, error);
    }

    fn on_connected(&self, addr: SocketAddr) {
        let _ = addr;
    }
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ConnectListener for NoopListener {}

/// Resolves and connects with ordered failover.
pub struct Connector<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> Connector<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Resolve `host:port` into candidate addresses, in resolver order.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .map_err(|e| Error::Connect {
                attempts: 0,
                source: e,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Connect {
                attempts: 0,
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses for {host}:{port}"),
                ),
            });
        }
        Ok(addrs)
    }

    /// Attempt each candidate in order, preserving the local-address
    /// binding, until one connects. The last failure is reported only once
    /// every candidate has been exhausted.
    pub async fn connect(
        &self,
        local: Option<SocketAddr>,
        candidates: &[SocketAddr],
        listener: &dyn ConnectListener,
    ) -> Result<T::Conn> {
        let mut last_error: Option<io::Error> = None;

        for &addr in candidates {
            tracing::debug!(%addr, "attempting connection");
            match self.transport.connect(local, addr).await {
                Ok(conn) => {
                    tracing::debug!(%addr, "TCP connect succeeded");
                    listener.on_connected(addr);
                    return Ok(conn);
                }
                Err(error) => {
                    tracing::debug!(%addr, %error, "connection attempt failed");
                    listener.on_attempt_failed(addr, &error);
                    last_error = Some(error);
                }
            }
        }

        Err(Error::Connect {
            attempts: candidates.len(),
            source: last_error.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "no candidate addresses")
            }),
        })
    }
}
