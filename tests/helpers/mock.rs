//! Scripted transport and codec for exercising the dispatcher without a
//! network.
//!
//! Each mock connection carries a queue of [`ServerAction`]s; every
//! response read pops one. The mock codec speaks a trivial line protocol
//! so tests can assert exactly which requests (and which dispatcher-added
//! headers) were written.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use wraith::error::{Error, Result};
use wraith::request::Request;
use wraith::response::Response;
use wraith::transport::{Connection, HttpCodec, Transport, WireRequest};

/// One scripted server behavior per response read.
#[derive(Clone, Debug)]
pub enum ServerAction {
    Respond {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },
    /// Close the connection before any response byte.
    CloseBeforeResponse,
    /// Never produce a response (for timeout and cancellation tests).
    Hang,
}

impl ServerAction {
    pub fn ok(body: &str) -> Self {
        Self::Respond {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn status(status: u16, headers: &[(&str, &str)]) -> Self {
        Self::Respond {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: String::new(),
        }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::status(status, &[("Location", location)])
    }
}

pub struct MockConn {
    id: usize,
    script: VecDeque<ServerAction>,
    log: Arc<Mutex<Vec<(usize, String)>>>,
    open: bool,
}

impl Connection for MockConn {
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        self.log
            .lock()
            .unwrap()
            .push((self.id, String::from_utf8_lossy(buf).into_owned()));
        async { Ok(()) }
    }

    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        let action = self.script.pop_front();
        let mut hang = false;
        let n = match action {
            Some(ServerAction::Respond {
                status,
                headers,
                body,
            }) => {
                let mut wire = format!("STATUS {status}\n");
                for (name, value) in &headers {
                    wire.push_str(&format!("{name}: {value}\n"));
                }
                wire.push('\n');
                wire.push_str(&body);
                let bytes = wire.as_bytes();
                buf[..bytes.len()].copy_from_slice(bytes);
                bytes.len()
            }
            Some(ServerAction::CloseBeforeResponse) | None => {
                self.open = false;
                0
            }
            Some(ServerAction::Hang) => {
                hang = true;
                0
            }
        };
        async move {
            if hang {
                std::future::pending::<()>().await;
            }
            Ok(n)
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Transport whose successive connections replay pre-loaded scripts.
///
/// Clones share state, so tests keep a clone for inspection after handing
/// the original to the dispatcher.
#[derive(Clone, Default)]
pub struct MockTransport {
    scripts: Arc<Mutex<VecDeque<Vec<ServerAction>>>>,
    refuse_next: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<(usize, String)>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the script for the next established connection.
    pub fn push_conn(&self, script: Vec<ServerAction>) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refuse_next.store(n, Ordering::SeqCst);
    }

    /// Number of successfully established connections.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Everything written, as (connection id, text) pairs.
    pub fn written(&self) -> Vec<(usize, String)> {
        self.log.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    type Conn = MockConn;

    fn connect(
        &self,
        _local: Option<SocketAddr>,
        _addr: SocketAddr,
    ) -> impl Future<Output = io::Result<MockConn>> + Send {
        let refuse = self
            .refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let conn = if refuse {
            None
        } else {
            let id = self.connects.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
            Some(MockConn {
                id,
                script: script.into(),
                log: self.log.clone(),
                open: true,
            })
        };
        async move {
            conn.ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    }
}

/// Line-protocol codec matching [`MockConn`]'s serialization.
pub struct MockCodec;

impl HttpCodec for MockCodec {
    fn encode(
        &self,
        request: &Request,
        force_connect: bool,
        extra_headers: &[(String, String)],
    ) -> Result<WireRequest> {
        let mut wire = if force_connect {
            format!("CONNECT {}\n", request.uri())
        } else {
            format!("{} {}\n", request.method(), request.uri())
        };
        for (name, value) in request.headers() {
            wire.push_str(&format!("{name}: {value}\n"));
        }
        for (name, value) in extra_headers {
            wire.push_str(&format!("{name}: {value}\n"));
        }
        Ok(WireRequest::new(Bytes::from(wire)))
    }

    fn read_response<C: Connection>(
        &self,
        conn: &mut C,
    ) -> impl Future<Output = Result<Response>> + Send {
        async move {
            let mut buf = vec![0u8; 16384];
            let n = conn.read(&mut buf).await?;
            if n == 0 {
                return Err(Error::ChannelClosed);
            }
            parse_response(&buf[..n])
        }
    }
}

fn parse_response(raw: &[u8]) -> Result<Response> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| Error::http_protocol("mock response not UTF-8"))?;
    let (head, body) = text
        .split_once("\n\n")
        .ok_or_else(|| Error::http_protocol("mock response missing header terminator"))?;

    let mut lines = head.lines();
    let status_line = lines
        .next()
        .ok_or_else(|| Error::http_protocol("empty mock response"))?;
    let status: u16 = status_line
        .strip_prefix("STATUS ")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::http_protocol("bad mock status line"))?;

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(": ")
            .ok_or_else(|| Error::http_protocol("bad mock header line"))?;
        headers.push((name.to_string(), value.to_string()));
    }

    Ok(Response::new(status, headers, Bytes::from(body.to_string())))
}
