//! Partitioned connection pool.
//!
//! Idle connections are keyed strictly by [`PartitionKey`]; a connection is
//! never handed to a request whose key differs. The pool also accounts for
//! *preempted* slots - reservations for connection attempts that have not
//! yet established - and fails fast when a per-partition or global cap is
//! exceeded.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::request::Request;
use crate::transport::Connection;

/// Identity of a reusable connection route: target host/port, TLS flag,
/// and proxy, if any. Requests with equal keys may share a pooled
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub proxy: Option<(String, u16)>,
}

impl PartitionKey {
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into().to_lowercase(),
            port,
            secure,
            proxy: None,
        }
    }

    pub fn via_proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy = Some((host.into().to_lowercase(), port));
        self
    }

    /// Derive the partition identity for a request.
    pub fn for_request(request: &Request) -> Result<Self> {
        let mut key = Self::new(request.host()?, request.port(), request.is_secure());
        if let Some(proxy) = request.proxy() {
            key.proxy = Some((proxy.host.clone(), proxy.port));
        }
        Ok(key)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if self.secure {
            write!(f, " (tls)")?;
        }
        if let Some((host, port)) = &self.proxy {
            write!(f, " via {host}:{port}")?;
        }
        Ok(())
    }
}

/// A transport connection plus its route identity.
///
/// Owned by the pool while idle; ownership transfers to the dispatcher for
/// the duration of an exchange.
#[derive(Debug)]
pub struct PooledConnection<C> {
    pub conn: C,
    key: PartitionKey,
    /// A CONNECT tunnel has been established on this connection.
    pub tunneled: bool,
}

impl<C> PooledConnection<C> {
    pub fn new(conn: C, key: PartitionKey) -> Self {
        Self {
            conn,
            key,
            tunneled: false,
        }
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }
}

struct IdleEntry<C> {
    conn: PooledConnection<C>,
    since: Instant,
}

struct PoolInner<C> {
    idle: HashMap<PartitionKey, Vec<IdleEntry<C>>>,
    preempted: HashMap<PartitionKey, usize>,
    preempted_total: usize,
}

/// Partition-keyed idle connection pool with preemption accounting.
pub struct ConnectionPool<C> {
    inner: Mutex<PoolInner<C>>,
    max_idle: Duration,
    max_preempted_per_partition: usize,
    max_preempted_total: usize,
}

impl<C: Connection> ConnectionPool<C> {
    pub fn new(
        max_idle: Duration,
        max_preempted_per_partition: usize,
        max_preempted_total: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                idle: HashMap::new(),
                preempted: HashMap::new(),
                preempted_total: 0,
            }),
            max_idle,
            max_preempted_per_partition,
            max_preempted_total,
        }
    }

    /// Take a live idle connection for the partition, if one exists.
    ///
    /// Entries that sit past the idle limit or fail the liveness check are
    /// discarded during the scan.
    pub fn acquire(&self, key: &PartitionKey) -> Option<PooledConnection<C>> {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let entries = inner.idle.get_mut(key)?;
        while let Some(entry) = entries.pop() {
            if entry.since.elapsed() >= self.max_idle {
                tracing::debug!(%key, idle = ?entry.since.elapsed(), "discarding idle-expired connection");
                continue;
            }
            if !entry.conn.conn.is_open() {
                tracing::debug!(%key, "discarding dead pooled connection");
                continue;
            }
            tracing::debug!(%key, "reusing pooled connection");
            return Some(entry.conn);
        }
        None
    }

    /// Return a connection after its exchange fully drained.
    ///
    /// A connection that no longer passes the liveness check is dropped
    /// instead of pooled.
    pub fn release(&self, conn: PooledConnection<C>) {
        if !conn.conn.is_open() {
            tracing::debug!(key = %conn.key, "dropping closed connection instead of pooling");
            return;
        }
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let key = conn.key.clone();
        let entries = inner.idle.entry(key.clone()).or_default();
        entries.push(IdleEntry {
            conn,
            since: Instant::now(),
        });
        tracing::debug!(%key, idle = entries.len(), "returned connection to pool");
    }

    /// Reserve a slot for a connection attempt on this partition.
    ///
    /// Fails fast with [`Error::TooManyConnections`] when the per-partition
    /// or global cap is reached - the caller must abort, not block. The
    /// reservation rolls back when the permit drops uncommitted, so every
    /// failure path releases the slot.
    pub fn mark_preempted(&self, key: &PartitionKey) -> Result<PreemptPermit<'_, C>> {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let count = inner.preempted.get(key).copied().unwrap_or(0);
        if count >= self.max_preempted_per_partition {
            return Err(Error::TooManyConnections(format!(
                "partition {key}: {count} attempts in flight"
            )));
        }
        if inner.preempted_total >= self.max_preempted_total {
            return Err(Error::TooManyConnections(format!(
                "{} attempts in flight globally",
                inner.preempted_total
            )));
        }
        *inner.preempted.entry(key.clone()).or_insert(0) += 1;
        inner.preempted_total += 1;
        Ok(PreemptPermit {
            pool: self,
            key: key.clone(),
            committed: false,
        })
    }

    fn end_preemption(&self, key: &PartitionKey, committed: bool) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        if let Some(count) = inner.preempted.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                inner.preempted.remove(key);
            }
        }
        inner.preempted_total = inner.preempted_total.saturating_sub(1);
        if !committed {
            tracing::debug!(%key, "rolled back preempted slot");
        }
    }

    /// Drop idle-expired and dead connections.
    pub fn cleanup(&self) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        for entries in inner.idle.values_mut() {
            entries.retain(|e| e.since.elapsed() < self.max_idle && e.conn.conn.is_open());
        }
        inner.idle.retain(|_, entries| !entries.is_empty());
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()>
    where
        C: 'static,
    {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                pool.cleanup();
            }
        })
    }

    /// Number of idle connections across all partitions.
    pub fn idle_count(&self) -> usize {
        let inner = self.inner.lock().expect("pool mutex poisoned");
        inner.idle.values().map(Vec::len).sum()
    }

    /// Number of reserved-but-not-established slots.
    pub fn preempted_count(&self) -> usize {
        self.inner.lock().expect("pool mutex poisoned").preempted_total
    }
}

/// Scoped preemption reservation.
///
/// Dropping the permit without [`commit`](Self::commit) rolls the slot
/// back; committing records that the connection was established.
pub struct PreemptPermit<'a, C: Connection> {
    pool: &'a ConnectionPool<C>,
    key: PartitionKey,
    committed: bool,
}

impl<C: Connection> PreemptPermit<'_, C> {
    /// The connection attempt succeeded; the reservation is no longer
    /// outstanding.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl<C: Connection> Drop for PreemptPermit<'_, C> {
    fn drop(&mut self) {
        self.pool.end_preemption(&self.key, self.committed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::io;

    struct FakeConn {
        open: bool,
    }

    impl FakeConn {
        fn new() -> Self {
            Self { open: true }
        }
    }

    impl Connection for FakeConn {
        fn write(&mut self, _buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
            async { Ok(()) }
        }
        fn read(&mut self, _buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
            async { Ok(0) }
        }
        fn is_open(&self) -> bool {
            self.open
        }
        fn close(&mut self) {
            self.open = false;
        }
    }

    fn pool() -> ConnectionPool<FakeConn> {
        ConnectionPool::new(Duration::from_secs(30), 2, 3)
    }

    fn key(host: &str) -> PartitionKey {
        PartitionKey::new(host, 80, false)
    }

    #[test]
    fn partition_isolation() {
        let pool = pool();
        let a = key("a.example.com");
        let b = key("b.example.com");

        pool.release(PooledConnection::new(FakeConn::new(), a.clone()));

        // A connection released under key A is never returned for key B.
        assert!(pool.acquire(&b).is_none());
        assert!(pool.acquire(&a).is_some());
        assert!(pool.acquire(&a).is_none());
    }

    #[test]
    fn key_includes_scheme_and_proxy() {
        let plain = PartitionKey::new("example.com", 443, false);
        let tls = PartitionKey::new("example.com", 443, true);
        let proxied = PartitionKey::new("example.com", 443, true).via_proxy("proxy.local", 3128);

        assert_ne!(plain, tls);
        assert_ne!(tls, proxied);
        assert_eq!(tls, PartitionKey::new("EXAMPLE.com", 443, true));
    }

    #[test]
    fn dead_connection_not_returned() {
        let pool = pool();
        let k = key("example.com");
        let mut conn = FakeConn::new();
        conn.close();

        // Release refuses it outright.
        pool.release(PooledConnection::new(conn, k.clone()));
        assert_eq!(pool.idle_count(), 0);

        // A connection that dies while pooled is skipped by acquire.
        pool.release(PooledConnection::new(FakeConn::new(), k.clone()));
        {
            let mut inner = pool.inner.lock().unwrap();
            inner.idle.get_mut(&k).unwrap()[0].conn.conn.open = false;
        }
        assert!(pool.acquire(&k).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_expiry() {
        let pool = ConnectionPool::new(Duration::from_secs(5), 2, 3);
        let k = key("example.com");
        pool.release(PooledConnection::new(FakeConn::new(), k.clone()));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(pool.acquire(&k).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_sweeps_expired() {
        let pool = ConnectionPool::new(Duration::from_secs(5), 2, 3);
        let k = key("example.com");
        pool.release(PooledConnection::new(FakeConn::new(), k.clone()));
        assert_eq!(pool.idle_count(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        pool.cleanup();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn preemption_caps_fail_fast() {
        let pool = pool();
        let k = key("example.com");

        let p1 = pool.mark_preempted(&k).unwrap();
        let _p2 = pool.mark_preempted(&k).unwrap();
        // Per-partition cap of 2.
        assert!(matches!(
            pool.mark_preempted(&k),
            Err(Error::TooManyConnections(_))
        ));

        // Global cap of 3 across partitions.
        let other = key("other.example.com");
        let _p3 = pool.mark_preempted(&other).unwrap();
        assert!(matches!(
            pool.mark_preempted(&key("third.example.com")),
            Err(Error::TooManyConnections(_))
        ));

        // Releasing a slot frees capacity again.
        drop(p1);
        assert!(pool.mark_preempted(&k).is_ok());
    }

    #[test]
    fn permit_rolls_back_on_drop_and_commit() {
        let pool = pool();
        let k = key("example.com");

        {
            let _permit = pool.mark_preempted(&k).unwrap();
            assert_eq!(pool.preempted_count(), 1);
        }
        assert_eq!(pool.preempted_count(), 0);

        let permit = pool.mark_preempted(&k).unwrap();
        permit.commit();
        assert_eq!(pool.preempted_count(), 0);
    }
}
