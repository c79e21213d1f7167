//! The cooperative poll loop.
//!
//! One [`Server::step`] accepts pending connections, gives every live
//! session one unit of work according to its state, then sweeps the
//! sessions that reached ENDING. Nothing in a step blocks.

use std::io;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::WebError;
use crate::fs::FileSystem;
use crate::http::form::Form;
use crate::http::parser::{find_headers_end, parse_request_head};
use crate::http::request::{Method, RequestHead};
use crate::http::response::StatusCode;
use crate::http::writer;
use crate::server::content::{self, Cx};
use crate::server::dynamic::{ExecHook, Hooks, PushProducer, PushSink, PushStatus};
use crate::server::pool::BufferPool;
use crate::server::registry::{SessionId, SessionRegistry};
use crate::server::session::{Session, SessionState};
use crate::server::transport::Transport;

/// Counters over the lifetime of a server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: u64,
    pub requests: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub timeouts: u64,
}

/// The server context: every session, buffer and collaborator lives here.
pub struct Server<T: Transport, F: FileSystem> {
    config: Config,
    transport: T,
    fs: F,
    pool: BufferPool,
    sessions: SessionRegistry,
    hooks: Hooks,
    stats: ServerStats,
}

enum Input {
    Data(usize),
    Closed,
    Pending,
}

impl<T: Transport, F: FileSystem> Server<T, F> {
    pub fn new(config: Config, transport: T, fs: F) -> Self {
        let pool = BufferPool::new(config.tx_segment_size, config.tx_pool_size);
        let sessions = SessionRegistry::new(config.max_sessions);
        Self {
            config,
            transport,
            fs,
            pool,
            sessions,
            hooks: Hooks::default(),
            stats: ServerStats::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Installs the handler for exec routes and SSI `exec` directives.
    pub fn set_exec_hook(&mut self, hook: impl ExecHook + 'static) {
        self.hooks.exec = Some(Box::new(hook));
    }

    /// Routes `path` to the exec hook; the query string becomes its
    /// argument.
    pub fn bind_exec(&mut self, path: impl Into<String>) {
        self.hooks.bind_exec(path.into());
    }

    /// Routes `path` to a push stream created per request by `factory`.
    pub fn bind_push<P>(&mut self, path: impl Into<String>, factory: P)
    where
        P: FnMut(&RequestHead) -> Box<dyn PushProducer> + 'static,
    {
        self.hooks.bind_push(path.into(), Box::new(factory));
    }

    pub fn step(&mut self) {
        self.step_at(Instant::now());
    }

    /// Runs one poll step as if the clock read `now`.
    pub fn step_at(&mut self, now: Instant) {
        self.accept(now);
        for id in self.sessions.ids() {
            self.step_session(id, now);
        }
        self.sweep();
    }

    /// Steps every `tick_ms` until `stop` returns true.
    pub fn poll(&mut self, mut stop: impl FnMut(&Self) -> bool) {
        let tick = Duration::from_millis(self.config.tick_ms);
        while !stop(self) {
            self.step();
            std::thread::sleep(tick);
        }
    }

    /// Closes every session and returns all segments to the pool.
    pub fn shutdown(&mut self) {
        for id in self.sessions.ids() {
            if let Some(mut session) = self.sessions.remove(id) {
                writer::release_all(&mut self.pool, &mut session.txq);
                self.transport.close(session.conn());
            }
        }
        tracing::info!("All sessions closed");
    }

    fn accept(&mut self, now: Instant) {
        while !self.sessions.is_full() {
            let conn = match self.transport.accept() {
                Ok(Some(conn)) => conn,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("accept failed: {}", e);
                    break;
                }
            };
            let secure = self.transport.is_secure(conn);
            let rx_capacity = self.config.rx_buffer_size;
            let inserted = self
                .sessions
                .insert(|id| Session::new(id, conn, rx_capacity, secure, now));
            match inserted {
                Some(id) => {
                    self.stats.accepted += 1;
                    tracing::debug!(session = ?id, conn = conn.0, secure, "Session created");
                }
                None => self.transport.close(conn),
            }
        }
    }

    fn sweep(&mut self) {
        let ending: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.state() == SessionState::Ending)
            .map(Session::id)
            .collect();
        for id in ending {
            if let Some(mut session) = self.sessions.remove(id) {
                writer::release_all(&mut self.pool, &mut session.txq);
                self.transport.close(session.conn());
                tracing::debug!(session = ?id, served = session.served(), "Session closed");
            }
        }
    }

    fn step_session(&mut self, id: SessionId, now: Instant) {
        let Self {
            config,
            transport,
            fs,
            pool,
            sessions,
            hooks,
            stats,
        } = self;
        let Some(session) = sessions.get_mut(id) else {
            return;
        };

        let timeout = Duration::from_secs(config.session_timeout_secs);
        if session.state() != SessionState::Ending
            && now.saturating_duration_since(session.last_active()) > timeout
        {
            tracing::warn!(session = ?id, state = session.state().as_str(), "Session timed out");
            stats.timeouts += 1;
            session.set_state(SessionState::Ending);
            return;
        }

        let mut cx = Cx {
            pool,
            fs,
            hooks,
            config,
        };
        match session.state() {
            SessionState::Header => read_header(&mut cx, transport, session, stats, now),
            SessionState::PostRx => read_body(&mut cx, transport, session, stats, now),
            SessionState::Content => step_content(&mut cx, transport, session, stats, now),
            SessionState::SendData => send_data(&mut cx, transport, session, stats, now),
            SessionState::Pushing => step_push(&mut cx, transport, session, stats, now),
            SessionState::Ending => {}
        }
    }
}

/// One non-blocking read into the session's input buffer.
fn receive<T: Transport>(
    transport: &mut T,
    session: &mut Session,
    stats: &mut ServerStats,
    now: Instant,
) -> Result<Input, WebError> {
    let start = session.rx.len();
    let free = session.rx_capacity().saturating_sub(start);
    if free == 0 {
        return Err(WebError::Client("input buffer overflow"));
    }
    session.rx.resize(start + free, 0);
    let result = transport.read(session.conn(), &mut session.rx[start..]);
    match result {
        Ok(0) => {
            session.rx.truncate(start);
            Ok(Input::Closed)
        }
        Ok(n) => {
            session.rx.truncate(start + n);
            session.touch(now);
            stats.bytes_in += n as u64;
            tracing::trace!(session = ?session.id(), bytes = n, "Read request data");
            Ok(Input::Data(n))
        }
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            session.rx.truncate(start);
            Ok(Input::Pending)
        }
        Err(e) => {
            session.rx.truncate(start);
            Err(WebError::Socket(e))
        }
    }
}

/// Reject the request from CONTENT with `status`; the connection closes.
fn reject(session: &mut Session, status: StatusCode) {
    session.flags.reading_cmds = false;
    session.flags.persist = false;
    session.pending_error = Some(status);
    session.set_state(SessionState::Content);
}

fn read_header<T: Transport>(
    cx: &mut Cx<'_>,
    transport: &mut T,
    session: &mut Session,
    stats: &mut ServerStats,
    now: Instant,
) {
    // Pipelined bytes may already hold a complete header.
    if find_headers_end(&session.rx).is_none() {
        match receive(transport, session, stats, now) {
            Ok(Input::Data(_)) => {}
            Ok(Input::Pending) => return,
            Ok(Input::Closed) => {
                if !session.rx.is_empty() {
                    tracing::debug!(session = ?session.id(), "Peer closed mid-request");
                }
                session.set_state(SessionState::Ending);
                return;
            }
            Err(WebError::Socket(e)) => {
                tracing::debug!(session = ?session.id(), error = %e, "Read failed");
                session.set_state(SessionState::Ending);
                return;
            }
            Err(e) => {
                tracing::debug!(session = ?session.id(), error = %e, "Request header too large");
                reject(session, StatusCode::BadRequest);
                return;
            }
        }
    }

    match parse_request_head(&session.rx) {
        Ok(None) => {
            if session.rx.len() >= session.rx_capacity() {
                tracing::debug!(session = ?session.id(), "Request header too large");
                reject(session, StatusCode::BadRequest);
            }
        }
        Err(e) => {
            tracing::debug!(session = ?session.id(), error = %e, "Malformed request");
            reject(session, e.status());
        }
        Ok(Some((head, consumed))) => accept_request(cx, session, stats, head, consumed),
    }
}

fn accept_request(
    cx: &mut Cx<'_>,
    session: &mut Session,
    stats: &mut ServerStats,
    head: RequestHead,
    consumed: usize,
) {
    stats.requests += 1;
    session.served += 1;
    tracing::info!(
        session = ?session.id(),
        method = head.method.as_str(),
        path = %head.path,
        version = head.version.as_str(),
        "Request"
    );

    session.flags.reading_cmds = false;
    session.flags.persist = head.keep_alive();
    session.body_start = consumed;
    let method = head.method;
    let content_length = head.content_length;
    let query = head.query.clone();
    session.request = Some(head);

    match method {
        Method::Unrecognized => reject(session, StatusCode::NotImplemented),
        Method::POST => match content_length {
            None => reject(session, StatusCode::LengthRequired),
            Some(len) if consumed + len > session.rx_capacity() => {
                reject(session, StatusCode::PayloadTooLarge)
            }
            Some(0) => {
                session.form = Some(Form::default());
                session.set_state(SessionState::Content);
            }
            Some(len) => {
                session.body_len = len;
                session.set_state(SessionState::PostRx);
            }
        },
        Method::GET | Method::PUT => {
            if let Some(query) = query {
                match Form::parse(query.as_bytes(), cx.config.max_form_params) {
                    Ok(form) => session.form = Some(form),
                    Err(e) => {
                        tracing::debug!(session = ?session.id(), error = %e, "Bad query string");
                        reject(session, e.status());
                        return;
                    }
                }
            }
            session.set_state(SessionState::Content);
        }
    }
}

fn read_body<T: Transport>(
    cx: &mut Cx<'_>,
    transport: &mut T,
    session: &mut Session,
    stats: &mut ServerStats,
    now: Instant,
) {
    let end = session.body_start + session.body_len;
    if session.rx.len() < end {
        match receive(transport, session, stats, now) {
            Ok(Input::Data(_)) => {}
            Ok(Input::Pending) => return,
            Ok(Input::Closed) | Err(_) => {
                tracing::debug!(session = ?session.id(), "Connection lost during POST body");
                session.set_state(SessionState::Ending);
                return;
            }
        }
    }
    if session.rx.len() < end {
        return;
    }

    match Form::parse(&session.rx[session.body_start..end], cx.config.max_form_params) {
        Ok(form) => {
            tracing::debug!(session = ?session.id(), fields = form.len(), "Form received");
            session.form = Some(form);
            session.set_state(SessionState::Content);
        }
        Err(e) => {
            tracing::debug!(session = ?session.id(), error = %e, "Bad form body");
            reject(session, e.status());
        }
    }
}

/// Moves staged bytes into segments. Returns false when the pool ran dry.
fn flush_staged(pool: &mut BufferPool, session: &mut Session) -> bool {
    let id = session.id();
    match writer::flush(pool, id, &mut session.txq, &mut session.staging) {
        Ok(_) => true,
        Err(_) => false,
    }
}

fn drain<T: Transport>(
    pool: &mut BufferPool,
    transport: &mut T,
    session: &mut Session,
    stats: &mut ServerStats,
    now: Instant,
) -> Result<usize, WebError> {
    let written = writer::drain(transport, session.conn(), pool, &mut session.txq)?;
    if written > 0 {
        session.touch(now);
        stats.bytes_out += written as u64;
    }
    Ok(written)
}

/// Tracks steps spent blocked on the pool and escalates past the limit.
///
/// Only a session holding no segments of its own counts as blocked; one with
/// a queue is waiting on its peer, which the idle timeout covers.
fn note_progress(cx: &mut Cx<'_>, session: &mut Session, blocked: bool, written: usize) {
    if !blocked || written > 0 || !session.txq.is_empty() {
        session.alloc_failures = 0;
        return;
    }
    session.alloc_failures += 1;
    tracing::trace!(session = ?session.id(), failures = session.alloc_failures, "Blocked on transmit buffers");
    if session.alloc_failures > cx.config.alloc_retry_limit {
        content::exhausted(cx, session);
    }
}

fn step_content<T: Transport>(
    cx: &mut Cx<'_>,
    transport: &mut T,
    session: &mut Session,
    stats: &mut ServerStats,
    now: Instant,
) {
    // A deferred body stays staged until its header exists.
    let mut blocked = session.flags.header_sent && !flush_staged(cx.pool, session);
    if !blocked {
        let before = session.content_len;
        if content::produce(cx, session).is_err() {
            blocked = true;
        }
        if session.content_len > before {
            session.touch(now);
        }
        if session.state() == SessionState::Content
            && !session.flags.header_sent
            && session.staging.len() > cx.config.max_deferred_body
        {
            content::commit_stream(cx, session);
        }
        if session.state() == SessionState::Ending {
            return;
        }
        if session.flags.header_sent {
            blocked |= !flush_staged(cx.pool, session);
        }
    }

    let mut written = 0;
    if session.flags.header_sent && session.state() == SessionState::Content {
        match drain(cx.pool, transport, session, stats, now) {
            Ok(n) => written = n,
            Err(e) => {
                tracing::debug!(session = ?session.id(), error = %e, "Write failed");
                session.set_state(SessionState::Ending);
                return;
            }
        }
    }
    note_progress(cx, session, blocked, written);
}

fn send_data<T: Transport>(
    cx: &mut Cx<'_>,
    transport: &mut T,
    session: &mut Session,
    stats: &mut ServerStats,
    now: Instant,
) {
    let blocked = !flush_staged(cx.pool, session);
    let written = match drain(cx.pool, transport, session, stats, now) {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(session = ?session.id(), error = %e, "Write failed");
            session.set_state(SessionState::Ending);
            return;
        }
    };
    if !session.staging.is_empty() || !session.txq.is_empty() {
        note_progress(cx, session, blocked, written);
        return;
    }
    if session.flags.persist {
        tracing::debug!(session = ?session.id(), "Response sent, keeping connection");
        session.reset_request();
        session.set_state(SessionState::Header);
    } else {
        tracing::debug!(session = ?session.id(), "Response sent, closing");
        session.set_state(SessionState::Ending);
    }
}

fn step_push<T: Transport>(
    cx: &mut Cx<'_>,
    transport: &mut T,
    session: &mut Session,
    stats: &mut ServerStats,
    now: Instant,
) {
    let mut blocked = !flush_staged(cx.pool, session);
    let written = match drain(cx.pool, transport, session, stats, now) {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(session = ?session.id(), error = %e, "Write failed");
            session.set_state(SessionState::Ending);
            return;
        }
    };

    if !blocked && !session.push_done {
        if let Some(mut producer) = session.push.take() {
            let status = producer.produce(&mut PushSink::new(session, &cx.config.server_name));
            session.push = Some(producer);
            match status {
                Ok(PushStatus::More) => {}
                Ok(PushStatus::Done) => {
                    tracing::debug!(session = ?session.id(), "Push stream complete");
                    session.push_done = true;
                    // A stream that wrote nothing still answers with a header.
                    let mut sink = PushSink::new(session, &cx.config.server_name);
                    if let Err(e) = sink.ensure_header() {
                        tracing::error!(session = ?session.id(), error = %e, "Cannot encode response header");
                        session.set_state(SessionState::Ending);
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(session = ?session.id(), error = %e, "Push producer failed");
                    session.set_state(SessionState::Ending);
                    return;
                }
            }
        } else {
            session.push_done = true;
        }
        blocked = !flush_staged(cx.pool, session);
    }

    if session.push_done && session.staging.is_empty() && session.txq.is_empty() {
        session.set_state(SessionState::Ending);
        return;
    }
    note_progress(cx, session, blocked, written);
}
