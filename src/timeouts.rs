//! Timeout configuration and per-exchange supervision.
//!
//! Three exchange-scoped timers plus a pool-level idle timer:
//!
//! - **connect**: bounds address resolution + TCP connect. Does NOT reset.
//! - **request**: bounds the whole exchange, submission to fully-received
//!   response. Does NOT reset.
//! - **read_idle**: bounds the gap between successive chunks of progress.
//!   RESETS on every write, read, or channel acquisition ("touch").
//! - pool idle: how long a pooled connection may sit unused. Lives in
//!   [`crate::pool`], not here.
//!
//! Expiry of any timer surfaces through the same abort path as other
//! terminal failures, carrying a distinguishable timeout error kind.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Error;

/// Timeout configuration for HTTP exchanges.
///
/// All timeouts are optional. When `None`, no timeout is applied for that
/// phase. Per-request overrides on [`crate::Request`] take precedence.
#[derive(Clone, Debug, Default)]
pub struct Timeouts {
    /// Timeout for establishing a connection (resolution + TCP connect).
    pub connect: Option<Duration>,

    /// Total deadline from request submission until the response is fully
    /// received. Expiry aborts the exchange unconditionally.
    pub request: Option<Duration>,

    /// Maximum time between successive chunks of forward progress.
    /// Resets on each touch; detects hung streams without killing healthy
    /// long transfers.
    pub read_idle: Option<Duration>,
}

impl Timeouts {
    /// Create a new Timeouts with all timeouts disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sensible defaults for API-style exchanges.
    ///
    /// - connect: 10s
    /// - request: 120s
    /// - read_idle: 30s
    pub fn defaults() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            request: Some(Duration::from_secs(120)),
            read_idle: Some(Duration::from_secs(30)),
        }
    }

    /// Defaults for streaming responses: no total deadline, long idle gap.
    pub fn streaming_defaults() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            request: None,
            read_idle: Some(Duration::from_secs(120)),
        }
    }

    /// Set connect timeout.
    pub fn connect(mut self, timeout: Duration) -> Self {
        self.connect = Some(timeout);
        self
    }

    /// Set the total request deadline.
    pub fn request(mut self, timeout: Duration) -> Self {
        self.request = Some(timeout);
        self
    }

    /// Set read idle timeout.
    pub fn read_idle(mut self, timeout: Duration) -> Self {
        self.read_idle = Some(timeout);
        self
    }

    /// Disable the total request deadline.
    pub fn no_request_timeout(mut self) -> Self {
        self.request = None;
        self
    }

    /// Disable the read idle timeout.
    pub fn no_read_idle_timeout(mut self) -> Self {
        self.read_idle = None;
        self
    }
}

/// Per-exchange timer supervisor.
///
/// Armed when an attempt starts. The dispatcher (and the supervised
/// connection adapter) call [`touch`](Self::touch) on any forward progress;
/// [`expired`](Self::expired) resolves when either the absolute request
/// deadline or the sliding read-idle deadline passes.
#[derive(Debug)]
pub struct TimeoutSupervisor {
    request_deadline: Option<Instant>,
    request_limit: Duration,
    read_idle: Option<Duration>,
    last_activity: Mutex<Instant>,
}

impl TimeoutSupervisor {
    /// Arm a supervisor from the effective timeout configuration.
    pub fn arm(timeouts: &Timeouts) -> Self {
        let now = Instant::now();
        Self {
            request_deadline: timeouts.request.map(|d| now + d),
            request_limit: timeouts.request.unwrap_or_default(),
            read_idle: timeouts.read_idle,
            last_activity: Mutex::new(now),
        }
    }

    /// Record forward progress, pushing the read-idle deadline out.
    pub fn touch(&self) {
        *self.last_activity.lock().expect("supervisor mutex poisoned") = Instant::now();
    }

    fn read_deadline(&self) -> Option<Instant> {
        let idle = self.read_idle?;
        let last = *self.last_activity.lock().expect("supervisor mutex poisoned");
        Some(last + idle)
    }

    /// Resolve once a timer expires, yielding the matching error kind.
    ///
    /// Never resolves if neither timer is configured. Intended for use in a
    /// `select!` against the exchange's I/O future.
    pub async fn expired(&self) -> Error {
        loop {
            let read = self.read_deadline();
            let next = match (self.request_deadline, read) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            };
            tokio::time::sleep_until(next).await;

            let now = Instant::now();
            if let Some(deadline) = self.request_deadline {
                if now >= deadline {
                    return Error::RequestTimeout(self.request_limit);
                }
            }
            if let (Some(idle), Some(deadline)) = (self.read_idle, self.read_deadline()) {
                // A touch may have pushed the deadline past the wakeup.
                if now >= deadline {
                    return Error::ReadTimeout(idle);
                }
            }
        }
    }
}
