//! Immutable request descriptors.
//!
//! A [`Request`] is never mutated once built; a redirect or retry produces a
//! *new* request derived from it.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Uri};
use url::Url;

use crate::auth::Realm;
use crate::error::{Error, Result};

/// A request body source.
///
/// Retry and replay logic must check the variant before resubmitting:
/// a [`Body::OneShot`] source has already been partially consumed by the
/// first write and can never be replayed.
#[derive(Clone, Debug)]
pub enum Body {
    /// No body.
    Empty,
    /// Seekable data that can be written any number of times.
    Replayable(Bytes),
    /// A streaming source that must not be written twice.
    OneShot(Bytes),
}

impl Body {
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Body::OneShot(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// The bytes a wire codec writes for this body.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Empty => None,
            Body::Replayable(b) | Body::OneShot(b) => Some(b),
        }
    }
}

/// A proxy endpoint requests may be routed through.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProxyServer {
    pub host: String,
    pub port: u16,
}

impl ProxyServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into().to_lowercase(),
            port,
        }
    }
}

/// Immutable HTTP request descriptor.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Body,
    realm: Option<Realm>,
    proxy_realm: Option<Realm>,
    proxy: Option<ProxyServer>,
    follow_redirects: Option<bool>,
    request_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    upgrade: bool,
}

impl Request {
    /// Start building a request.
    pub fn builder(method: Method, uri: Uri) -> RequestBuilder {
        RequestBuilder {
            request: Request {
                method,
                uri,
                headers: Vec::new(),
                cookies: Vec::new(),
                body: Body::Empty,
                realm: None,
                proxy_realm: None,
                proxy: None,
                follow_redirects: None,
                request_timeout: None,
                read_timeout: None,
                upgrade: false,
            },
        }
    }

    /// Shorthand for a GET request with no body.
    pub fn get(uri: Uri) -> Request {
        Self::builder(Method::GET, uri).build()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn realm(&self) -> Option<&Realm> {
        self.realm.as_ref()
    }

    pub fn proxy_realm(&self) -> Option<&Realm> {
        self.proxy_realm.as_ref()
    }

    pub fn proxy(&self) -> Option<&ProxyServer> {
        self.proxy.as_ref()
    }

    pub fn follow_redirects(&self) -> Option<bool> {
        self.follow_redirects
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Whether the caller registered an upgrade-capable handler.
    pub fn expects_upgrade(&self) -> bool {
        self.upgrade
    }

    /// Whether the target scheme is TLS-secured (`https` or `wss`).
    pub fn is_secure(&self) -> bool {
        matches!(self.uri.scheme_str(), Some("https") | Some("wss"))
    }

    /// Whether the target scheme is a WebSocket scheme (`ws` or `wss`).
    pub fn is_websocket(&self) -> bool {
        matches!(self.uri.scheme_str(), Some("ws") | Some("wss"))
    }

    /// Target host, lower-cased.
    pub fn host(&self) -> Result<String> {
        self.uri
            .host()
            .map(|h| h.to_lowercase())
            .ok_or_else(|| Error::validation("request URI has no host"))
    }

    /// Target port, defaulted by scheme.
    pub fn port(&self) -> u16 {
        self.uri
            .port_u16()
            .unwrap_or(if self.is_secure() { 443 } else { 80 })
    }

    /// Derive the follow-up request for a redirect response.
    ///
    /// Relative locations are resolved against the current URI. Per legacy
    /// client behavior, 303 always becomes a GET; 301/302 downgrade
    /// non-idempotent methods to GET and drop the body; 307/308 preserve
    /// method and body.
    pub fn redirected(&self, status: u16, location: &str) -> Result<Request> {
        let base = Url::parse(&self.uri.to_string())
            .map_err(|e| Error::InvalidRedirect(e.to_string()))?;
        let target = base
            .join(location)
            .map_err(|e| Error::InvalidRedirect(format!("{location}: {e}")))?;
        let uri: Uri = target
            .as_str()
            .parse()
            .map_err(|_| Error::InvalidRedirect(target.to_string()))?;

        let downgrade = match status {
            303 => true,
            301 | 302 => self.method != Method::GET && self.method != Method::HEAD,
            _ => false,
        };

        let mut next = self.clone();
        next.uri = uri;
        if downgrade {
            next.method = Method::GET;
            next.body = Body::Empty;
            next.headers
                .retain(|(name, _)| !name.eq_ignore_ascii_case("content-type"));
        }
        Ok(next)
    }
}

/// Builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Attach an explicit cookie, sent in addition to jar matches.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.cookies.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.request.body = body;
        self
    }

    pub fn realm(mut self, realm: Realm) -> Self {
        self.request.realm = Some(realm);
        self
    }

    pub fn proxy_realm(mut self, realm: Realm) -> Self {
        self.request.proxy_realm = Some(realm);
        self
    }

    pub fn proxy(mut self, proxy: ProxyServer) -> Self {
        self.request.proxy = Some(proxy);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.request.follow_redirects = Some(follow);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request.request_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.request.read_timeout = Some(timeout);
        self
    }

    /// Declare that the caller's handler can take over an upgraded
    /// connection (required for `ws`/`wss` requests).
    pub fn upgrade(mut self, upgrade: bool) -> Self {
        self.request.upgrade = upgrade;
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}
