//! Client configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::timeouts::Timeouts;

/// Configuration shared by every exchange a dispatcher runs.
///
/// Per-request settings on [`crate::Request`] override the corresponding
/// fields here for that exchange only.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Maximum retries after a pre-response channel close. Exceeding this
    /// surfaces the close error to the caller.
    pub max_retries: u32,

    /// Maximum redirects followed per exchange.
    pub max_redirects: u32,

    /// Whether redirects are followed at all (per-request flag overrides).
    pub follow_redirects: bool,

    /// Maximum reserved-but-not-yet-established pool slots per partition.
    pub max_preempted_per_partition: usize,

    /// Maximum reserved-but-not-yet-established pool slots overall.
    pub max_preempted_total: usize,

    /// How long a pooled connection may sit idle before it is discarded.
    pub pool_idle_timeout: Duration,

    /// Local address to bind outgoing connections to.
    pub local_address: Option<SocketAddr>,

    /// Default timeout configuration.
    pub timeouts: Timeouts,
}

impl ClientConfig {
    /// Default maximum idle duration for pooled connections (30 seconds).
    const DEFAULT_POOL_IDLE: Duration = Duration::from_secs(30);

    /// Default preempted-slot cap per partition.
    const DEFAULT_PREEMPTED_PER_PARTITION: usize = 6;

    /// Default preempted-slot cap across all partitions.
    const DEFAULT_PREEMPTED_TOTAL: usize = 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry bound for pre-response channel closes.
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set the redirect bound.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Enable or disable redirect following.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Set the pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set the preempted-slot caps.
    pub fn preempted_caps(mut self, per_partition: usize, total: usize) -> Self {
        self.max_preempted_per_partition = per_partition;
        self.max_preempted_total = total;
        self
    }

    /// Bind outgoing connections to a local address.
    pub fn local_address(mut self, addr: SocketAddr) -> Self {
        self.local_address = Some(addr);
        self
    }

    /// Set the default timeout configuration.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            max_redirects: 5,
            follow_redirects: true,
            max_preempted_per_partition: Self::DEFAULT_PREEMPTED_PER_PARTITION,
            max_preempted_total: Self::DEFAULT_PREEMPTED_TOTAL,
            pool_idle_timeout: Self::DEFAULT_POOL_IDLE,
            local_address: None,
            timeouts: Timeouts::defaults(),
        }
    }
}
