#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;

use microweb::config::Config;
use microweb::fs::FileSystem;
use microweb::server::{ConnHandle, Server, Transport};

#[derive(Default)]
struct Conn {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    peer_closed: bool,
    closed: bool,
    secure: bool,
    /// Bytes the socket accepts before reporting `WouldBlock`
    write_quota: Option<usize>,
    reads: usize,
}

#[derive(Default)]
struct Net {
    pending: VecDeque<ConnHandle>,
    conns: HashMap<ConnHandle, Conn>,
    next: u64,
}

/// In-memory transport. Clones share the same network, so a test keeps one
/// handle while the server owns another.
#[derive(Clone, Default)]
pub struct MockNet {
    net: Rc<RefCell<Net>>,
}

impl MockNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a connection for the next accept.
    pub fn connect(&self) -> ConnHandle {
        let mut net = self.net.borrow_mut();
        net.next += 1;
        let conn = ConnHandle(net.next);
        net.conns.insert(conn, Conn::default());
        net.pending.push_back(conn);
        conn
    }

    pub fn connect_secure(&self) -> ConnHandle {
        let conn = self.connect();
        self.with(conn, |c| c.secure = true);
        conn
    }

    pub fn send(&self, conn: ConnHandle, bytes: impl AsRef<[u8]>) {
        self.with(conn, |c| c.inbound.extend(bytes.as_ref()));
    }

    /// The peer closes its side.
    pub fn hangup(&self, conn: ConnHandle) {
        self.with(conn, |c| c.peer_closed = true);
    }

    pub fn output(&self, conn: ConnHandle) -> Vec<u8> {
        self.with(conn, |c| c.outbound.clone())
    }

    pub fn output_text(&self, conn: ConnHandle) -> String {
        String::from_utf8_lossy(&self.output(conn)).into_owned()
    }

    pub fn is_closed(&self, conn: ConnHandle) -> bool {
        self.with(conn, |c| c.closed)
    }

    pub fn reads(&self, conn: ConnHandle) -> usize {
        self.with(conn, |c| c.reads)
    }

    /// Limits how many more bytes the socket accepts; `None` is unlimited.
    pub fn set_write_quota(&self, conn: ConnHandle, quota: Option<usize>) {
        self.with(conn, |c| c.write_quota = quota);
    }

    fn with<R>(&self, conn: ConnHandle, f: impl FnOnce(&mut Conn) -> R) -> R {
        let mut net = self.net.borrow_mut();
        let c = net.conns.get_mut(&conn).expect("unknown connection");
        f(c)
    }
}

impl Transport for MockNet {
    fn accept(&mut self) -> io::Result<Option<ConnHandle>> {
        Ok(self.net.borrow_mut().pending.pop_front())
    }

    fn read(&mut self, conn: ConnHandle, buf: &mut [u8]) -> io::Result<usize> {
        self.with(conn, |c| {
            if c.closed {
                return Err(io::ErrorKind::NotConnected.into());
            }
            c.reads += 1;
            if c.inbound.is_empty() {
                return if c.peer_closed {
                    Ok(0)
                } else {
                    Err(io::ErrorKind::WouldBlock.into())
                };
            }
            let n = buf.len().min(c.inbound.len());
            for (dst, src) in buf.iter_mut().zip(c.inbound.drain(..n)) {
                *dst = src;
            }
            Ok(n)
        })
    }

    fn write(&mut self, conn: ConnHandle, buf: &[u8]) -> io::Result<usize> {
        self.with(conn, |c| {
            if c.closed || c.peer_closed {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            let n = match c.write_quota {
                Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
                Some(quota) => {
                    let n = quota.min(buf.len());
                    c.write_quota = Some(quota - n);
                    n
                }
                None => buf.len(),
            };
            c.outbound.extend_from_slice(&buf[..n]);
            Ok(n)
        })
    }

    fn close(&mut self, conn: ConnHandle) {
        self.with(conn, |c| c.closed = true);
    }

    fn is_secure(&self, conn: ConnHandle) -> bool {
        self.net
            .borrow()
            .conns
            .get(&conn)
            .is_some_and(|c| c.secure)
    }
}

/// Small limits so tests exercise segmentation.
pub fn test_config() -> Config {
    Config {
        server_name: "microweb/test".to_string(),
        max_sessions: 4,
        rx_buffer_size: 512,
        tx_segment_size: 64,
        tx_pool_size: 32,
        content_quantum: 128,
        alloc_retry_limit: 5,
        tick_ms: 1,
        ..Config::default()
    }
}

pub fn run<T: Transport, F: FileSystem>(server: &mut Server<T, F>, steps: usize) {
    for _ in 0..steps {
        server.step();
    }
}

/// Checks the buffer invariants: every used segment belongs to exactly one
/// live session's queue and never has more sent than filled.
pub fn assert_pool_consistent<T: Transport, F: FileSystem>(server: &Server<T, F>) {
    let mut queued = 0;
    for session in server.sessions().iter() {
        for id in session.queued() {
            let segment = server.pool().get(id);
            assert_eq!(segment.owner(), Some(session.id()));
            assert!(segment.sent() <= segment.total());
            queued += 1;
        }
    }
    assert_eq!(queued, server.pool().in_use());
    for (_, segment) in server.pool().owned() {
        let owner = segment.owner().unwrap();
        assert!(server.session(owner).is_some());
    }
}

#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub status_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Splits raw output into responses using their Content-Length. A response
/// without one takes the rest of the stream.
pub fn parse_replies(mut data: &[u8]) -> Vec<Reply> {
    let mut replies = Vec::new();
    while let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
        let head = std::str::from_utf8(&data[..end]).unwrap();
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap().to_string();
        let status = status_line.split(' ').nth(1).unwrap().parse().unwrap();
        let headers: Vec<(String, String)> = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        let rest = &data[end + 4..];
        let len = headers
            .iter()
            .find(|(k, _)| k == "Content-Length")
            .map(|(_, v)| v.parse::<usize>().unwrap())
            .unwrap_or(rest.len())
            .min(rest.len());
        replies.push(Reply {
            status,
            status_line,
            headers,
            body: rest[..len].to_vec(),
        });
        data = &rest[len..];
    }
    replies
}

pub fn single_reply(net: &MockNet, conn: ConnHandle) -> Reply {
    let mut replies = parse_replies(&net.output(conn));
    assert_eq!(replies.len(), 1, "expected one response");
    replies.remove(0)
}
