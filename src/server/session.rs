//! Per-connection session record and its state machine.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::Instant;

use bytes::{BufMut, BytesMut};

use crate::error::WebError;
use crate::http::form::Form;
use crate::http::request::RequestHead;
use crate::http::response::StatusCode;
use crate::server::dynamic::PushProducer;
use crate::server::include::IncludeStack;
use crate::server::pool::SegmentId;
use crate::server::registry::SessionId;
use crate::server::transport::ConnHandle;

/// Session states.
///
/// ```text
///   HEADER ──► POSTRX ──► CONTENT ──► SENDDATA ──► HEADER (persistent)
///     │                    ▲  │          │
///     └────────────────────┘  ▼          ▼
///                          PUSHING ──► ENDING ◄── (any state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading the request line and header block
    Header,
    /// Reading a POST body
    PostRx,
    /// Producing the response
    Content,
    /// Draining the queued response
    SendData,
    /// Streaming from a push producer
    Pushing,
    /// Waiting to be swept
    Ending,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (_, Ending)
                | (Header, PostRx)
                | (Header, Content)
                | (PostRx, Content)
                | (Content, SendData)
                | (Content, Pushing)
                | (SendData, Header)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Header => "HEADER",
            SessionState::PostRx => "POSTRX",
            SessionState::Content => "CONTENT",
            SessionState::SendData => "SENDDATA",
            SessionState::Pushing => "PUSHING",
            SessionState::Ending => "ENDING",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// Still collecting the request header
    pub reading_cmds: bool,
    /// Content is not scanned for includes
    pub binary: bool,
    /// The response header has been produced
    pub header_sent: bool,
    /// Keep the connection for another request
    pub persist: bool,
    /// Response comes from a push producer
    pub server_push: bool,
    /// Transport reported a secure connection
    pub secure: bool,
}

/// Where content production of the current response stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Production {
    /// Route not chosen yet
    Open,
    /// Reading from the include stack
    Files,
    /// Everything produced; header and hand-off to SENDDATA remain
    Finish,
}

pub struct Session {
    id: SessionId,
    conn: ConnHandle,
    state: SessionState,
    pub(crate) flags: SessionFlags,
    last_active: Instant,

    pub(crate) rx: BytesMut,
    rx_capacity: usize,
    /// Offset of the request body in `rx`
    pub(crate) body_start: usize,
    /// Declared body length of the current request
    pub(crate) body_len: usize,

    pub(crate) request: Option<RequestHead>,
    pub(crate) mime: Option<&'static str>,
    pub(crate) form: Option<Form>,
    pub(crate) files: IncludeStack,
    pub(crate) push: Option<Box<dyn PushProducer>>,
    pub(crate) push_done: bool,

    pub(crate) txq: VecDeque<SegmentId>,
    /// Produced bytes waiting for segment space
    pub(crate) staging: BytesMut,
    pub(crate) production: Production,
    /// Status of the deferred header
    pub(crate) status: StatusCode,
    /// Error decided while reading the request, answered from CONTENT
    pub(crate) pending_error: Option<StatusCode>,
    /// Content bytes produced for the current response
    pub(crate) content_len: usize,
    /// Consecutive steps blocked on the buffer pool
    pub(crate) alloc_failures: u32,
    pub(crate) served: u32,
}

impl Session {
    pub fn new(
        id: SessionId,
        conn: ConnHandle,
        rx_capacity: usize,
        secure: bool,
        now: Instant,
    ) -> Self {
        Self {
            id,
            conn,
            state: SessionState::Header,
            flags: SessionFlags {
                reading_cmds: true,
                secure,
                ..SessionFlags::default()
            },
            last_active: now,
            rx: BytesMut::with_capacity(rx_capacity),
            rx_capacity,
            body_start: 0,
            body_len: 0,
            request: None,
            mime: None,
            form: None,
            files: IncludeStack::new(),
            push: None,
            push_done: false,
            txq: VecDeque::new(),
            staging: BytesMut::new(),
            production: Production::Open,
            status: StatusCode::Ok,
            pending_error: None,
            content_len: 0,
            alloc_failures: 0,
            served: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn conn(&self) -> ConnHandle {
        self.conn
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    pub fn request(&self) -> Option<&RequestHead> {
        self.request.as_ref()
    }

    /// MIME type chosen when content was opened
    pub fn mime(&self) -> Option<&'static str> {
        self.mime
    }

    pub fn form(&self) -> Option<&Form> {
        self.form.as_ref()
    }

    /// Segments waiting to be transmitted, front first
    pub fn queued(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.txq.iter().copied()
    }

    pub fn rx_capacity(&self) -> usize {
        self.rx_capacity
    }

    /// Requests answered on this connection so far
    pub fn served(&self) -> u32 {
        self.served
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form.as_ref().and_then(|f| f.value(name))
    }

    pub fn form_int(&self, name: &str) -> Result<Option<i64>, WebError> {
        self.form.as_ref().map_or(Ok(None), |f| f.int(name))
    }

    pub fn form_bool(&self, name: &str) -> Result<bool, WebError> {
        self.form.as_ref().map_or(Ok(false), |f| f.bool(name))
    }

    pub fn form_ipaddr(&self, name: &str) -> Result<Option<Ipv4Addr>, WebError> {
        self.form.as_ref().map_or(Ok(None), |f| f.ipaddr(name))
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_active = now;
    }

    /// Moves to `next` if the edge is allowed.
    ///
    /// Returns false (and leaves the state alone) for an illegal edge.
    pub(crate) fn set_state(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                session = ?self.id,
                from = self.state.as_str(),
                to = next.as_str(),
                "Illegal session state transition"
            );
            debug_assert!(false, "illegal transition {:?} -> {:?}", self.state, next);
            return false;
        }
        tracing::trace!(
            session = ?self.id,
            from = self.state.as_str(),
            to = next.as_str(),
            "State transition"
        );
        self.state = next;
        true
    }

    /// Appends response body bytes.
    pub(crate) fn emit(&mut self, bytes: &[u8]) {
        self.staging.put_slice(bytes);
        self.content_len += bytes.len();
    }

    /// Appends header bytes, which do not count toward the content length.
    pub(crate) fn emit_header(&mut self, bytes: &[u8]) {
        self.staging.put_slice(bytes);
    }

    /// Puts a deferred header in front of the body staged so far.
    ///
    /// Deferred bodies never reach the transmit queue before their header.
    pub(crate) fn prepend_header(&mut self, head: &[u8]) {
        debug_assert!(self.txq.is_empty());
        let mut out = BytesMut::with_capacity(head.len() + self.staging.len());
        out.put_slice(head);
        out.put_slice(&self.staging);
        self.staging = out;
    }

    /// Prepares the session for the next request on a persistent
    /// connection. Pipelined bytes past the current request are kept.
    pub(crate) fn reset_request(&mut self) {
        let consumed = (self.body_start + self.body_len).min(self.rx.len());
        let _ = self.rx.split_to(consumed);
        self.body_start = 0;
        self.body_len = 0;
        self.request = None;
        self.mime = None;
        self.form = None;
        self.files.clear();
        self.push = None;
        self.push_done = false;
        self.staging.clear();
        self.production = Production::Open;
        self.status = StatusCode::Ok;
        self.pending_error = None;
        self.content_len = 0;
        self.alloc_failures = 0;
        self.flags = SessionFlags {
            reading_cmds: true,
            secure: self.flags.secure,
            ..SessionFlags::default()
        };
    }
}
