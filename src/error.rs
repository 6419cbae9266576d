//! Error types for the wraith crate.

use std::io;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while executing an HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed request/handler combination. No I/O was attempted.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Every candidate address failed. Carries the last attempt's failure.
    #[error("Connect failed after {attempts} attempt(s): {source}")]
    Connect {
        attempts: usize,
        #[source]
        source: io::Error,
    },

    /// Peer closed the connection before any response byte arrived.
    #[error("Connection closed before response")]
    ChannelClosed,

    /// Connect timeout (address resolution + TCP connect).
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// Total request deadline exceeded.
    #[error("Request timeout after {0:?}")]
    RequestTimeout(Duration),

    /// Read idle timeout (no progress within duration).
    #[error("Read timeout after {0:?} - stream may be hung")]
    ReadTimeout(Duration),

    /// Preempted-slot cap reached for a partition or globally.
    #[error("Too many outstanding connection attempts for {0}")]
    TooManyConnections(String),

    /// Malformed NTLM server message. Fatal to the authentication attempt.
    #[error("NTLM decode error: {0}")]
    NtlmDecode(String),

    /// Cookie parsing error. Callers drop the single offending cookie.
    #[error("Cookie parse error: {0}")]
    CookieParse(String),

    /// Redirect limit exceeded.
    #[error("Redirect limit exceeded ({count} redirects)")]
    RedirectLimit { count: u32 },

    /// Invalid redirect Location.
    #[error("Invalid redirect URL: {0}")]
    InvalidRedirect(String),

    /// The exchange was cancelled before completion.
    #[error("Exchange aborted")]
    Aborted,

    /// HTTP protocol error reported by the wire codec.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// Proxy CONNECT handshake failed.
    #[error("CONNECT tunnel refused with status {0}")]
    TunnelFailed(u16),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create an NTLM decode error.
    pub fn ntlm(message: impl Into<String>) -> Self {
        Self::NtlmDecode(message.into())
    }

    /// Create a cookie parse error.
    pub fn cookie(message: impl Into<String>) -> Self {
        Self::CookieParse(message.into())
    }

    /// Create an IO error with a custom message.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(io::Error::other(message.into()))
    }

    /// Timeout expiry of any kind. Timeouts are terminal for an exchange
    /// and are never retried automatically.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout(_) | Self::RequestTimeout(_) | Self::ReadTimeout(_)
        )
    }

    /// Errors that must surface without consulting retry or replay logic.
    pub(crate) fn is_terminal(&self) -> bool {
        self.is_timeout()
            || matches!(
                self,
                Self::Validation(_)
                    | Self::Aborted
                    | Self::RedirectLimit { .. }
                    | Self::InvalidRedirect(_)
                    | Self::TooManyConnections(_)
            )
    }
}
