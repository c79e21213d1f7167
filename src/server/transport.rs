//! Transport collaborator.
//!
//! The engine never blocks on a socket: `accept`, `read` and `write` either
//! make progress or report `WouldBlock`.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

use anyhow::Context;

/// Opaque connection handle issued by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle(pub u64);

pub trait Transport {
    /// Returns a new connection, or `None` when none is pending.
    fn accept(&mut self) -> io::Result<Option<ConnHandle>>;

    /// `Ok(0)` means the peer closed; `WouldBlock` means no data yet.
    fn read(&mut self, conn: ConnHandle, buf: &mut [u8]) -> io::Result<usize>;

    /// `WouldBlock` means the socket cannot take more bytes right now.
    fn write(&mut self, conn: ConnHandle, buf: &[u8]) -> io::Result<usize>;

    fn close(&mut self, conn: ConnHandle);

    /// True when the connection is protected by the transport (e.g. TLS).
    fn is_secure(&self, _conn: ConnHandle) -> bool {
        false
    }
}

/// Non-blocking TCP over `std::net`.
pub struct TcpTransport {
    listener: TcpListener,
    streams: HashMap<ConnHandle, TcpStream>,
    next: u64,
}

impl TcpTransport {
    pub fn bind(addr: &str) -> anyhow::Result<Self> {
        let listener =
            TcpListener::bind(addr).with_context(|| format!("failed to bind {}", addr))?;
        listener
            .set_nonblocking(true)
            .context("failed to make listener non-blocking")?;
        Ok(Self {
            listener,
            streams: HashMap::new(),
            next: 1,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn open_connections(&self) -> usize {
        self.streams.len()
    }

    fn stream(&mut self, conn: ConnHandle) -> io::Result<&mut TcpStream> {
        self.streams
            .get_mut(&conn)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

impl Transport for TcpTransport {
    fn accept(&mut self) -> io::Result<Option<ConnHandle>> {
        let (stream, peer) = match self.listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e),
        };
        stream.set_nonblocking(true)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, "set_nodelay failed: {}", e);
        }

        let conn = ConnHandle(self.next);
        self.next += 1;
        self.streams.insert(conn, stream);
        tracing::info!("Accepted connection from {}", peer);
        Ok(Some(conn))
    }

    fn read(&mut self, conn: ConnHandle, buf: &mut [u8]) -> io::Result<usize> {
        self.stream(conn)?.read(buf)
    }

    fn write(&mut self, conn: ConnHandle, buf: &[u8]) -> io::Result<usize> {
        self.stream(conn)?.write(buf)
    }

    fn close(&mut self, conn: ConnHandle) {
        if let Some(stream) = self.streams.remove(&conn) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
