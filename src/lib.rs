//! # Wraith
//!
//! Execution core of an asynchronous HTTP client: given a request
//! descriptor, wraith acquires or creates a connection through a
//! partitioned pool, transmits the request, supervises timeouts, and
//! decides whether to retry, redirect, replay (for authentication
//! challenges), or fail permanently - while reusing connections and
//! tracking per-domain cookies.
//!
//! HTTP/1.1 framing, TLS, and WebSocket codecs are collaborator traits
//! ([`transport::HttpCodec`], [`transport::Transport`]); this crate owns
//! the hard parts around them: the retry/redirect/replay state machine,
//! pool partitioning and preemption accounting, failover connecting, the
//! RFC 6265 cookie jar, and the NTLM challenge-response codec.

pub mod auth;
pub mod config;
pub mod connector;
pub mod cookie;
pub mod dispatch;
pub mod error;
pub mod ntlm;
pub mod pool;
pub mod request;
pub mod response;
pub mod timeouts;
pub mod transport;

// Re-exports
pub use auth::{AuthScheme, Realm};
pub use config::ClientConfig;
pub use cookie::{Cookie, CookieJar};
pub use dispatch::{Dispatcher, ExchangeHandle, InFlightExchange, ReplayFilter};
pub use error::{Error, Result};
pub use pool::{ConnectionPool, PartitionKey, PooledConnection};
pub use request::{Body, ProxyServer, Request, RequestBuilder};
pub use response::Response;
pub use timeouts::Timeouts;
pub use transport::{TcpTransport, WireRequest};
