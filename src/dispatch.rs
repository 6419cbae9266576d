//! Request dispatcher: the retry/redirect/replay state machine.
//!
//! An exchange moves through `NEW → (tunnel?) → CONNECTING|POOLED →
//! WRITING → AWAITING_RESPONSE → {COMPLETED | RETRY | REPLAY | ABORTED}`,
//! written as an explicit async loop rather than chained callbacks. The
//! dispatcher owns channel acquisition order (bound connection, then pool,
//! then preempt-and-connect), the CONNECT-tunnel decision, preemptive and
//! challenge-driven authentication, the bounded retry for pre-response
//! channel closes, and redirect re-entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tokio::sync::Notify;

use crate::auth::{challenge_response, AuthScheme, Realm};
use crate::config::ClientConfig;
use crate::connector::{ConnectListener, Connector, NoopListener};
use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::pool::{ConnectionPool, PartitionKey, PooledConnection};
use crate::request::Request;
use crate::response::Response;
use crate::timeouts::{TimeoutSupervisor, Timeouts};
use crate::transport::{Connection, HttpCodec, Supervised, Transport};

/// Decides whether an I/O failure should be replayed instead of surfaced.
///
/// Filters run before the error becomes terminal; the first filter that
/// answers `true` wins, and the request is resubmitted on a fresh
/// connection (only ever for replayable bodies).
pub trait ReplayFilter: Send + Sync {
    fn should_replay(&self, request: &Request, error: &Error) -> bool;
}

/// Completion state shared between an exchange and its cancellation handle.
///
/// The done flag is an atomic test-and-set: whichever of completion, abort,
/// or cancellation flips it first wins, and every later signal is a no-op.
#[derive(Debug, Default)]
pub struct Completion {
    done: AtomicBool,
    cancelled: AtomicBool,
    notify: Notify,
}

impl Completion {
    /// Flip the done flag; true for exactly one caller.
    fn try_finish(&self) -> bool {
        !self.done.swap(true, Ordering::SeqCst)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled_wait(&self) {
        while !self.is_cancelled() {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Cancellation handle for an in-flight exchange.
#[derive(Debug, Clone)]
pub struct ExchangeHandle {
    completion: Arc<Completion>,
}

impl ExchangeHandle {
    /// Cancel the exchange. Marks it done, so the caller's completion path
    /// never fires afterwards; the dispatcher observes the flag at its next
    /// suspension point and surfaces [`Error::Aborted`].
    pub fn cancel(&self) {
        self.completion.cancelled.store(true, Ordering::SeqCst);
        self.completion.done.store(true, Ordering::SeqCst);
        self.completion.notify.notify_waiters();
    }

    pub fn is_done(&self) -> bool {
        self.completion.is_done()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    None,
    /// NTLM Type 1 sent; a Type 2 challenge is expected next.
    NegotiateSent,
    Responded,
}

/// Mutable per-exchange record: the current request, retry and redirect
/// counters, auth negotiation state, and the bound connection.
pub struct InFlightExchange<C> {
    request: Request,
    retries: u32,
    redirects: u32,
    auth_state: AuthState,
    proxy_auth_state: AuthState,
    auth_header: Option<String>,
    proxy_auth_header: Option<String>,
    conn: Option<PooledConnection<C>>,
    wrote_bytes: bool,
    completion: Arc<Completion>,
}

impl<C: Connection> InFlightExchange<C> {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            retries: 0,
            redirects: 0,
            auth_state: AuthState::None,
            proxy_auth_state: AuthState::None,
            auth_header: None,
            proxy_auth_header: None,
            conn: None,
            wrote_bytes: false,
            completion: Arc::new(Completion::default()),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn handle(&self) -> ExchangeHandle {
        ExchangeHandle {
            completion: self.completion.clone(),
        }
    }

    fn take_connection(&mut self) -> Option<PooledConnection<C>> {
        self.conn.take()
    }

    fn bind_connection(&mut self, conn: PooledConnection<C>) {
        self.conn = Some(conn);
    }

    fn drop_connection(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.conn.close();
        }
    }

    fn reset_auth(&mut self) {
        self.auth_state = AuthState::None;
        self.proxy_auth_state = AuthState::None;
        self.auth_header = None;
        self.proxy_auth_header = None;
    }
}

enum Outcome {
    Complete(Response),
    Redirect(Request),
    Replay,
}

/// WebSocket targets require an upgrade-capable handler, and vice versa.
/// Violations fail before any I/O is attempted.
fn validate(request: &Request) -> Result<()> {
    if request.is_websocket() && !request.expects_upgrade() {
        return Err(Error::validation(
            "ws/wss URI requires an upgrade-capable handler",
        ));
    }
    if request.expects_upgrade() && !request.is_websocket() {
        return Err(Error::validation(
            "upgrade handler requires a ws or wss URI",
        ));
    }
    Ok(())
}

/// A CONNECT round-trip is needed for proxied TLS or WebSocket targets
/// whose connection has no tunnel yet, unless the request is itself a
/// CONNECT.
fn needs_tunnel(request: &Request, tunneled: bool) -> bool {
    request.proxy().is_some()
        && (request.is_secure() || request.is_websocket())
        && !tunneled
        && request.method() != Method::CONNECT
}

/// The challenge header value matching the realm's scheme, if present.
fn scheme_challenge<'a>(response: &'a Response, header: &str, scheme: AuthScheme) -> Option<&'a str> {
    let prefix = match scheme {
        AuthScheme::Basic => "basic",
        AuthScheme::Digest => "digest",
        AuthScheme::Ntlm => "ntlm",
    };
    response
        .get_headers(header)
        .into_iter()
        .find(|v| v.to_ascii_lowercase().starts_with(prefix))
}

/// Whether an NTLM challenge carries a Type 2 payload.
fn ntlm_payload(challenge: &str) -> bool {
    challenge
        .trim()
        .strip_prefix("NTLM")
        .is_some_and(|rest| !rest.trim().is_empty())
}

/// Top-level request orchestrator.
pub struct Dispatcher<T: Transport, K: HttpCodec> {
    codec: K,
    connector: Connector<T>,
    pool: Arc<ConnectionPool<T::Conn>>,
    jar: Arc<CookieJar>,
    config: ClientConfig,
    filters: Vec<Box<dyn ReplayFilter>>,
    listener: Box<dyn ConnectListener>,
}

impl<T: Transport, K: HttpCodec> Dispatcher<T, K> {
    pub fn new(transport: T, codec: K, config: ClientConfig) -> Self {
        let transport = Arc::new(transport);
        let pool = Arc::new(ConnectionPool::new(
            config.pool_idle_timeout,
            config.max_preempted_per_partition,
            config.max_preempted_total,
        ));
        Self {
            codec,
            connector: Connector::new(transport),
            pool,
            jar: Arc::new(CookieJar::new()),
            config,
            filters: Vec::new(),
            listener: Box::new(NoopListener),
        }
    }

    /// Share a cookie jar with other dispatchers or the application.
    pub fn with_cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.jar = jar;
        self
    }

    pub fn with_connect_listener(mut self, listener: impl ConnectListener + 'static) -> Self {
        self.listener = Box::new(listener);
        self
    }

    pub fn add_replay_filter(mut self, filter: impl ReplayFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<T::Conn>> {
        &self.pool
    }

    /// Create the exchange record for a request, e.g. to obtain a
    /// cancellation handle before running it.
    pub fn new_exchange(&self, request: Request) -> InFlightExchange<T::Conn> {
        InFlightExchange::new(request)
    }

    /// Execute a request to completion.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let mut exchange = self.new_exchange(request);
        self.run(&mut exchange).await
    }

    /// Drive an exchange to its terminal outcome.
    pub async fn run(&self, exchange: &mut InFlightExchange<T::Conn>) -> Result<Response> {
        validate(&exchange.request)?;
        let result = self.drive(exchange).await;
        if exchange.completion.try_finish() {
            result
        } else {
            // Cancellation already consumed the done flag: the caller must
            // never observe a completion after cancelling.
            Err(Error::Aborted)
        }
    }

    async fn drive(&self, exchange: &mut InFlightExchange<T::Conn>) -> Result<Response> {
        loop {
            if exchange.completion.is_cancelled() {
                self.release_on_cancel(exchange);
                return Err(Error::Aborted);
            }

            match self.attempt(exchange).await {
                Ok(Outcome::Complete(response)) => return Ok(response),
                Ok(Outcome::Redirect(next)) => {
                    exchange.redirects += 1;
                    if exchange.redirects > self.config.max_redirects {
                        return Err(Error::RedirectLimit {
                            count: exchange.redirects,
                        });
                    }
                    tracing::debug!(uri = %next.uri(), "following redirect");
                    exchange.request = next;
                    exchange.reset_auth();
                }
                Ok(Outcome::Replay) => {}
                Err(error) => {
                    if error.is_terminal() {
                        exchange.drop_connection();
                        return Err(error);
                    }
                    if exchange.request.body().is_replayable()
                        && self
                            .filters
                            .iter()
                            .any(|f| f.should_replay(&exchange.request, &error))
                    {
                        tracing::debug!(%error, "replay filter requested resubmission");
                        exchange.drop_connection();
                        continue;
                    }
                    if matches!(error, Error::ChannelClosed)
                        && exchange.request.body().is_replayable()
                        && exchange.retries < self.config.max_retries
                    {
                        exchange.retries += 1;
                        tracing::debug!(
                            retry = exchange.retries,
                            "channel closed before response, retrying on a fresh connection"
                        );
                        exchange.drop_connection();
                        continue;
                    }
                    exchange.drop_connection();
                    return Err(error);
                }
            }
        }
    }

    /// On cancellation, an untouched bound connection goes back to the
    /// pool; one with bytes already sent is closed.
    fn release_on_cancel(&self, exchange: &mut InFlightExchange<T::Conn>) {
        if let Some(mut conn) = exchange.take_connection() {
            if exchange.wrote_bytes {
                conn.conn.close();
            } else {
                self.pool.release(conn);
            }
        }
    }

    fn effective_timeouts(&self, request: &Request) -> Timeouts {
        let mut timeouts = self.config.timeouts.clone();
        if let Some(t) = request.request_timeout() {
            timeouts.request = Some(t);
        }
        if let Some(t) = request.read_timeout() {
            timeouts.read_idle = Some(t);
        }
        timeouts
    }

    fn follows_redirects(&self, request: &Request) -> bool {
        request
            .follow_redirects()
            .unwrap_or(self.config.follow_redirects)
    }

    async fn attempt(&self, exchange: &mut InFlightExchange<T::Conn>) -> Result<Outcome> {
        let timeouts = self.effective_timeouts(&exchange.request);
        let supervisor = TimeoutSupervisor::arm(&timeouts);

        // Channel acquisition: bound connection, then pool, then
        // preempt-and-connect.
        let mut pconn = match exchange.take_connection() {
            Some(conn) if conn.conn.is_open() => conn,
            Some(mut dead) => {
                dead.conn.close();
                self.acquire_or_connect(&exchange.request, timeouts.connect)
                    .await?
            }
            None => {
                self.acquire_or_connect(&exchange.request, timeouts.connect)
                    .await?
            }
        };
        supervisor.touch();
        exchange.wrote_bytes = false;

        if needs_tunnel(&exchange.request, pconn.tunneled) {
            if let Err(error) = self.establish_tunnel(exchange, &mut pconn, &supervisor).await {
                pconn.conn.close();
                return Err(error);
            }
        }

        let extra = self.request_decorations(exchange);
        let wire = self.codec.encode(&exchange.request, false, &extra)?;

        exchange.wrote_bytes = true;
        let completion = exchange.completion.clone();
        let io = async {
            let mut supervised = Supervised::new(&mut pconn.conn, &supervisor);
            wire.write(&mut supervised).await?;
            self.codec.read_response(&mut supervised).await
        };
        let response = tokio::select! {
            result = io => result,
            error = supervisor.expired() => Err(error),
            _ = completion.cancelled_wait() => Err(Error::Aborted),
        };
        let response = match response {
            Ok(response) => response,
            Err(error) => {
                pconn.conn.close();
                return Err(error);
            }
        };

        // Every Set-Cookie is offered to the jar; a single malformed cookie
        // is dropped, not the response.
        for set_cookie in response.get_headers("Set-Cookie") {
            if let Err(error) = self.jar.add_from_header(exchange.request.uri(), set_cookie) {
                tracing::debug!(%error, "dropping malformed Set-Cookie");
            }
        }

        self.interpret(exchange, pconn, response)
    }

    /// Classify a drained response: auth replay, redirect, or completion.
    fn interpret(
        &self,
        exchange: &mut InFlightExchange<T::Conn>,
        pconn: PooledConnection<T::Conn>,
        response: Response,
    ) -> Result<Outcome> {
        let mut slot = Some(pconn);

        // Authentication challenges. NTLM replays on the same connection;
        // the handshake is connection-affine.
        if response.status == 401 && exchange.request.realm().is_some() {
            let realm = exchange.request.realm().unwrap().clone();
            if let Some(outcome) = self.advance_auth(
                &realm,
                &response,
                "WWW-Authenticate",
                false,
                exchange,
                &mut slot,
            )? {
                return Ok(outcome);
            }
        }
        if response.status == 407 && exchange.request.proxy_realm().is_some() {
            let realm = exchange.request.proxy_realm().unwrap().clone();
            if let Some(outcome) = self.advance_auth(
                &realm,
                &response,
                "Proxy-Authenticate",
                true,
                exchange,
                &mut slot,
            )? {
                return Ok(outcome);
            }
        }

        let pconn = slot.take().expect("connection consumed without replay");

        // Redirects re-enter the pipeline; the response body is already
        // drained, so the connection can be reused when the server allows.
        if response.is_redirect() && self.follows_redirects(&exchange.request) {
            if let Some(location) = response.redirect_location() {
                let preserves_body = matches!(response.status, 307 | 308);
                if preserves_body && !exchange.request.body().is_replayable() {
                    tracing::debug!(
                        "redirect would replay a one-shot body, surfacing the response instead"
                    );
                } else {
                    let next = exchange.request.redirected(response.status, location)?;
                    self.finish_with(pconn, &response);
                    return Ok(Outcome::Redirect(next));
                }
            }
        }

        self.finish_with(pconn, &response);
        Ok(Outcome::Complete(response))
    }

    /// Advance the (proxy-)auth state machine for a challenge response.
    /// `Some(Replay)` resubmits; `None` lets the response surface.
    fn advance_auth(
        &self,
        realm: &Realm,
        response: &Response,
        challenge_header: &str,
        proxy: bool,
        exchange: &mut InFlightExchange<T::Conn>,
        slot: &mut Option<PooledConnection<T::Conn>>,
    ) -> Result<Option<Outcome>> {
        let state = if proxy {
            exchange.proxy_auth_state
        } else {
            exchange.auth_state
        };
        if state == AuthState::Responded {
            // Credentials were already presented and rejected.
            return Ok(None);
        }

        let Some(challenge) = scheme_challenge(response, challenge_header, realm.scheme) else {
            return Ok(None);
        };

        let has_payload = ntlm_payload(challenge);
        if realm.scheme == AuthScheme::Ntlm && state == AuthState::NegotiateSent && !has_payload {
            // Negotiation was not answered with a Type 2; give up.
            return Ok(None);
        }

        let header = challenge_response(
            realm,
            challenge,
            exchange.request.method().as_str(),
            exchange.request.uri().path(),
        )?;
        let next_state = if realm.scheme == AuthScheme::Ntlm && !has_payload {
            AuthState::NegotiateSent
        } else {
            AuthState::Responded
        };

        if proxy {
            exchange.proxy_auth_state = next_state;
            exchange.proxy_auth_header = Some(header);
        } else {
            exchange.auth_state = next_state;
            exchange.auth_header = Some(header);
        }

        let mut conn = slot.take().expect("connection consumed twice");
        if response.is_keep_alive() {
            // Keep the connection bound for the replay.
            exchange.bind_connection(conn);
        } else {
            conn.conn.close();
        }
        Ok(Some(Outcome::Replay))
    }

    /// Pool or close the connection once the exchange is fully drained.
    fn finish_with(&self, mut pconn: PooledConnection<T::Conn>, response: &Response) {
        if response.is_keep_alive() {
            self.pool.release(pconn);
        } else {
            pconn.conn.close();
        }
    }

    /// Dispatcher-computed header values: Cookie from the jar, plus
    /// Authorization / Proxy-Authorization. A challenge-derived header
    /// wins over preemptive credentials; NTLM is never preemptive.
    fn request_decorations(&self, exchange: &InFlightExchange<T::Conn>) -> Vec<(String, String)> {
        let mut extra = Vec::new();

        let mut pairs: Vec<String> = self
            .jar
            .get(exchange.request.uri())
            .iter()
            .map(|c| c.pair())
            .collect();
        for (name, value) in exchange.request.cookies() {
            pairs.retain(|p| !p.starts_with(&format!("{name}=")));
            pairs.push(format!("{name}={value}"));
        }
        if !pairs.is_empty() {
            extra.push(("Cookie".to_string(), pairs.join("; ")));
        }

        if let Some(header) = &exchange.auth_header {
            extra.push(("Authorization".to_string(), header.clone()));
        } else if let Some(realm) = exchange.request.realm() {
            if let Some(header) = realm.preemptive_header() {
                extra.push(("Authorization".to_string(), header));
            }
        }

        if exchange.request.proxy().is_some() {
            if let Some(header) = &exchange.proxy_auth_header {
                extra.push(("Proxy-Authorization".to_string(), header.clone()));
            } else if let Some(realm) = exchange.request.proxy_realm() {
                if let Some(header) = realm.preemptive_header() {
                    extra.push(("Proxy-Authorization".to_string(), header));
                }
            }
        }

        extra
    }

    /// Poll the pool, else reserve a preemption slot and connect. A failed
    /// reservation aborts the exchange with the cap error; it never
    /// silently proceeds without a connection.
    async fn acquire_or_connect(
        &self,
        request: &Request,
        connect_timeout: Option<Duration>,
    ) -> Result<PooledConnection<T::Conn>> {
        let key = PartitionKey::for_request(request)?;
        if let Some(conn) = self.pool.acquire(&key) {
            return Ok(conn);
        }

        let permit = self.pool.mark_preempted(&key)?;

        // Connect to the proxy when one is configured, else the origin.
        let (host, port) = match request.proxy() {
            Some(proxy) => (proxy.host.clone(), proxy.port),
            None => (request.host()?, request.port()),
        };

        let connect = async {
            let candidates = self.connector.resolve(&host, port).await?;
            self.connector
                .connect(self.config.local_address, &candidates, self.listener.as_ref())
                .await
        };
        let conn = match connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| Error::ConnectTimeout(limit))??,
            None => connect.await?,
        };

        permit.commit();
        Ok(PooledConnection::new(conn, key))
    }

    /// HTTP CONNECT round-trip with the proxy, with a single replay for a
    /// Proxy-Authenticate challenge when a proxy realm is configured.
    async fn establish_tunnel(
        &self,
        exchange: &mut InFlightExchange<T::Conn>,
        pconn: &mut PooledConnection<T::Conn>,
        supervisor: &TimeoutSupervisor,
    ) -> Result<()> {
        for attempt in 0..2 {
            let mut extra = Vec::new();
            if let Some(header) = &exchange.proxy_auth_header {
                extra.push(("Proxy-Authorization".to_string(), header.clone()));
            } else if let Some(realm) = exchange.request.proxy_realm() {
                if let Some(header) = realm.preemptive_header() {
                    extra.push(("Proxy-Authorization".to_string(), header));
                }
            }

            let wire = self.codec.encode(&exchange.request, true, &extra)?;
            let completion = exchange.completion.clone();
            let io = async {
                let mut supervised = Supervised::new(&mut pconn.conn, supervisor);
                wire.write(&mut supervised).await?;
                self.codec.read_response(&mut supervised).await
            };
            let response = tokio::select! {
                result = io => result?,
                error = supervisor.expired() => return Err(error),
                _ = completion.cancelled_wait() => return Err(Error::Aborted),
            };

            if response.is_success() {
                pconn.tunneled = true;
                return Ok(());
            }

            if response.status == 407 && attempt == 0 && response.is_keep_alive() {
                if let Some(realm) = exchange.request.proxy_realm().cloned() {
                    if let Some(challenge) =
                        scheme_challenge(&response, "Proxy-Authenticate", realm.scheme)
                    {
                        exchange.proxy_auth_header =
                            Some(challenge_response(&realm, challenge, "CONNECT", "/")?);
                        exchange.proxy_auth_state = AuthState::Responded;
                        continue;
                    }
                }
            }
            return Err(Error::TunnelFailed(response.status));
        }
        unreachable!("tunnel loop always returns within two attempts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Body, ProxyServer};
    use bytes::Bytes;

    fn get(uri: &str) -> Request {
        Request::get(uri.parse().unwrap())
    }

    #[test]
    fn validate_websocket_mismatch() {
        // ws scheme without an upgrade handler fails before any I/O.
        assert!(matches!(
            validate(&get("ws://example.com/socket")),
            Err(Error::Validation(_))
        ));

        // Upgrade handler on a plain http request is equally invalid.
        let req = Request::builder(Method::GET, "http://example.com/".parse().unwrap())
            .upgrade(true)
            .build();
        assert!(matches!(validate(&req), Err(Error::Validation(_))));

        let ok = Request::builder(Method::GET, "ws://example.com/socket".parse().unwrap())
            .upgrade(true)
            .build();
        assert!(validate(&ok).is_ok());
        assert!(validate(&get("https://example.com/")).is_ok());
    }

    #[test]
    fn tunnel_decision() {
        let proxied_tls = Request::builder(Method::GET, "https://example.com/".parse().unwrap())
            .proxy(ProxyServer::new("proxy.local", 3128))
            .build();
        assert!(needs_tunnel(&proxied_tls, false));
        // Already tunneled: no second CONNECT.
        assert!(!needs_tunnel(&proxied_tls, true));

        // Plain http through a proxy needs no tunnel.
        let proxied_plain = Request::builder(Method::GET, "http://example.com/".parse().unwrap())
            .proxy(ProxyServer::new("proxy.local", 3128))
            .build();
        assert!(!needs_tunnel(&proxied_plain, false));

        // No proxy, no tunnel.
        assert!(!needs_tunnel(&get("https://example.com/"), false));

        // A CONNECT request is never wrapped in another tunnel.
        let connect = Request::builder(Method::CONNECT, "https://example.com/".parse().unwrap())
            .proxy(ProxyServer::new("proxy.local", 3128))
            .build();
        assert!(!needs_tunnel(&connect, false));

        // Proxied WebSocket upgrades tunnel too.
        let ws = Request::builder(Method::GET, "ws://example.com/".parse().unwrap())
            .upgrade(true)
            .proxy(ProxyServer::new("proxy.local", 3128))
            .build();
        assert!(needs_tunnel(&ws, false));
    }

    #[test]
    fn challenge_selection_matches_scheme() {
        let response = Response::new(
            401,
            vec![
                ("WWW-Authenticate".into(), "Basic realm=\"r\"".into()),
                ("WWW-Authenticate".into(), "NTLM".into()),
            ],
            Bytes::new(),
        );
        assert_eq!(
            scheme_challenge(&response, "WWW-Authenticate", AuthScheme::Ntlm),
            Some("NTLM")
        );
        assert_eq!(
            scheme_challenge(&response, "WWW-Authenticate", AuthScheme::Basic),
            Some("Basic realm=\"r\"")
        );
        assert_eq!(
            scheme_challenge(&response, "WWW-Authenticate", AuthScheme::Digest),
            None
        );
    }

    #[test]
    fn ntlm_payload_detection() {
        assert!(!ntlm_payload("NTLM"));
        assert!(!ntlm_payload("NTLM   "));
        assert!(ntlm_payload("NTLM TlRMTVNTUAACAAAA"));
    }

    #[test]
    fn completion_is_test_and_set() {
        let completion = Completion::default();
        assert!(completion.try_finish());
        assert!(!completion.try_finish());
        assert!(completion.is_done());
    }

    #[test]
    fn cancel_marks_done() {
        let exchange: InFlightExchange<crate::transport::TcpConn> =
            InFlightExchange::new(get("http://example.com/"));
        let handle = exchange.handle();
        handle.cancel();
        assert!(handle.is_done());
        assert!(exchange.completion.is_cancelled());
        // Completion after cancellation is suppressed.
        assert!(!exchange.completion.try_finish());
    }

    #[test]
    fn oneshot_body_blocks_retry_eligibility() {
        let replayable = Request::builder(Method::POST, "http://example.com/".parse().unwrap())
            .body(Body::Replayable(Bytes::from_static(b"x")))
            .build();
        let oneshot = Request::builder(Method::POST, "http://example.com/".parse().unwrap())
            .body(Body::OneShot(Bytes::from_static(b"x")))
            .build();
        assert!(replayable.body().is_replayable());
        assert!(!oneshot.body().is_replayable());
    }
}
