//! Collaborator interfaces the core consumes, plus the default TCP
//! transport.
//!
//! The core never frames HTTP/1.1 itself: a [`HttpCodec`] builds wire
//! requests and parses responses, and a [`Transport`] establishes raw
//! connections. Both are narrow traits so tests (and alternative stacks)
//! can substitute their own.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::timeouts::TimeoutSupervisor;

/// An established transport connection.
pub trait Connection: Send {
    /// Write the whole buffer.
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Read into the buffer, returning the number of bytes read.
    /// A return of 0 for a non-empty buffer means the peer closed.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Cheap liveness check: open and not half-closed. The pool refuses to
    /// hand out connections that fail this.
    fn is_open(&self) -> bool;

    /// Mark the connection unusable; the underlying socket closes on drop.
    fn close(&mut self);
}

/// Connection factory.
pub trait Transport: Send + Sync + 'static {
    type Conn: Connection + Send + 'static;

    /// Establish a connection to `addr`, optionally binding `local` first.
    fn connect(
        &self,
        local: Option<SocketAddr>,
        addr: SocketAddr,
    ) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}

/// Wire request/response codec.
///
/// `read_response` must yield [`Error::ChannelClosed`] when the peer closes
/// before the first response byte arrives - the dispatcher's retry decision
/// depends on that distinction.
pub trait HttpCodec: Send + Sync + 'static {
    /// Build the bytes for a request. With `force_connect`, build an HTTP
    /// CONNECT for the request's proxy instead of the request itself.
    /// `extra_headers` carries dispatcher-computed values (Cookie,
    /// Authorization, Proxy-Authorization).
    fn encode(
        &self,
        request: &Request,
        force_connect: bool,
        extra_headers: &[(String, String)],
    ) -> Result<WireRequest>;

    /// Read one full response from the connection.
    fn read_response<C: Connection>(
        &self,
        conn: &mut C,
    ) -> impl Future<Output = Result<Response>> + Send;
}

/// An encoded request ready to transmit.
#[derive(Debug, Clone)]
pub struct WireRequest {
    bytes: Bytes,
}

impl WireRequest {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Transmit the request on `conn`.
    pub async fn write<C: Connection>(&self, conn: &mut C) -> Result<()> {
        conn.write(&self.bytes).await.map_err(Error::from)
    }
}

/// Adapter that reports I/O progress to a [`TimeoutSupervisor`], so the
/// read-idle timer resets on every successful write or read.
pub struct Supervised<'a, C> {
    conn: &'a mut C,
    timer: &'a TimeoutSupervisor,
}

impl<'a, C: Connection> Supervised<'a, C> {
    pub fn new(conn: &'a mut C, timer: &'a TimeoutSupervisor) -> Self {
        Self { conn, timer }
    }
}

impl<C: Connection> Connection for Supervised<'_, C> {
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            let result = self.conn.write(buf).await;
            if result.is_ok() {
                self.timer.touch();
            }
            result
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            let result = self.conn.read(buf).await;
            if matches!(result, Ok(n) if n > 0) {
                self.timer.touch();
            }
            result
        }
    }

    fn is_open(&self) -> bool {
        self.conn.is_open()
    }

    fn close(&mut self) {
        self.conn.close()
    }
}

/// Default transport over tokio TCP.
#[derive(Debug, Default, Clone)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for TcpTransport {
    type Conn = TcpConn;

    fn connect(
        &self,
        local: Option<SocketAddr>,
        addr: SocketAddr,
    ) -> impl Future<Output = io::Result<TcpConn>> + Send {
        async move {
            let stream = match local {
                Some(local) => {
                    let socket = if addr.is_ipv4() {
                        TcpSocket::new_v4()?
                    } else {
                        TcpSocket::new_v6()?
                    };
                    socket.bind(local)?;
                    socket.connect(addr).await?
                }
                None => TcpStream::connect(addr).await?,
            };
            stream.set_nodelay(true)?;
            Ok(TcpConn { stream, open: true })
        }
    }
}

/// A plain TCP connection.
#[derive(Debug)]
pub struct TcpConn {
    stream: TcpStream,
    open: bool,
}

impl Connection for TcpConn {
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            match self.stream.write_all(buf).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    self.open = false;
                    Err(e)
                }
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            match self.stream.read(buf).await {
                Ok(0) if !buf.is_empty() => {
                    self.open = false;
                    Ok(0)
                }
                Ok(n) => Ok(n),
                Err(e) => {
                    self.open = false;
                    Err(e)
                }
            }
        }
    }

    /// Open, and no EOF or stray bytes pending. An idle HTTP/1.1 connection
    /// with readable data is either half-closed or broken, so any
    /// non-blocking read result other than `WouldBlock` disqualifies it.
    fn is_open(&self) -> bool {
        if !self.open {
            return false;
        }
        let mut probe = [0u8; 1];
        match self.stream.try_read(&mut probe) {
            Ok(_) => false,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(_) => false,
        }
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeouts::Timeouts;
    use std::time::Duration;

    #[tokio::test]
    async fn tcp_connect_and_roundtrip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            sock.read_exact(&mut buf).await.unwrap();
            sock.write_all(&buf).await.unwrap();
        });

        let mut conn = TcpTransport::new().connect(None, addr).await.unwrap();
        conn.write(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_read_eof_marks_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
        });

        let mut conn = TcpTransport::new().connect(None, addr).await.unwrap();
        let mut buf = [0u8; 16];
        // Peer closes without sending; read yields EOF eventually.
        loop {
            match conn.read(&mut buf).await {
                Ok(0) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn supervised_touches_on_progress() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1];
            let _ = sock.read_exact(&mut buf).await;
            let _ = sock.write_all(b"x").await;
        });

        let timer = TimeoutSupervisor::arm(&Timeouts::new().read_idle(Duration::from_secs(60)));
        let mut conn = TcpTransport::new().connect(None, addr).await.unwrap();
        let mut sup = Supervised::new(&mut conn, &timer);
        sup.write(b"y").await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(sup.read(&mut buf).await.unwrap(), 1);
    }
}
