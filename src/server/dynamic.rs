//! Dynamic content: exec hooks and push producers.
//!
//! An exec hook answers requests for paths registered with
//! [`crate::server::Server::bind_exec`] and SSI `exec` directives. A push
//! producer streams a response of unknown length a piece at a time.

use std::net::Ipv4Addr;
use std::time::SystemTime;

use crate::error::WebError;
use crate::http::response::{ResponseBuilder, StatusCode};
use crate::http::request::{RequestHead, Version};
use crate::server::session::Session;

/// Handler for script-style requests.
///
/// Returns the status of the response: 200 sends what was written through
/// the context, any other code sends the matching error page.
pub trait ExecHook {
    fn exec(&mut self, cx: &mut ExecContext<'_>, args: &str) -> Result<u16, WebError>;
}

impl<F> ExecHook for F
where
    F: FnMut(&mut ExecContext<'_>, &str) -> Result<u16, WebError>,
{
    fn exec(&mut self, cx: &mut ExecContext<'_>, args: &str) -> Result<u16, WebError> {
        self(cx, args)
    }
}

/// What an exec hook sees of the session it runs for.
pub struct ExecContext<'a> {
    session: &'a mut Session,
    pub(crate) location: Option<String>,
}

impl<'a> ExecContext<'a> {
    pub(crate) fn new(session: &'a mut Session) -> Self {
        Self {
            session,
            location: None,
        }
    }

    pub fn request(&self) -> Option<&RequestHead> {
        self.session.request()
    }

    pub fn uri(&self) -> &str {
        self.session.request().map_or("", |r| r.path.as_str())
    }

    pub fn query(&self) -> Option<&str> {
        self.session.request().and_then(|r| r.query.as_deref())
    }

    pub fn secure(&self) -> bool {
        self.session.flags().secure
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.session.form_value(name)
    }

    pub fn form_int(&self, name: &str) -> Result<Option<i64>, WebError> {
        self.session.form_int(name)
    }

    pub fn form_bool(&self, name: &str) -> Result<bool, WebError> {
        self.session.form_bool(name)
    }

    pub fn form_ipaddr(&self, name: &str) -> Result<Option<Ipv4Addr>, WebError> {
        self.session.form_ipaddr(name)
    }

    pub fn put_str(&mut self, text: &str) {
        self.session.emit(text.as_bytes());
    }

    pub fn put_long(&mut self, value: i64) {
        self.session.emit(value.to_string().as_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.session.emit(bytes);
    }

    /// Content type of the response. Ignored inside an included page, whose
    /// type was fixed when the page was opened.
    pub fn set_content_type(&mut self, mime: &'static str) {
        if self.session.mime.is_none() {
            self.session.mime = Some(mime);
        }
    }

    /// Answers with a redirect instead of the written output.
    pub fn redirect(&mut self, location: impl Into<String>) {
        self.location = Some(location.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    /// Call again on a later step
    More,
    /// The stream is complete
    Done,
}

pub trait PushProducer {
    /// Writes the next piece of the stream.
    fn produce(&mut self, sink: &mut PushSink<'_>) -> Result<PushStatus, WebError>;
}

/// Output side of a push stream.
pub struct PushSink<'a> {
    session: &'a mut Session,
    server_name: &'a str,
}

impl<'a> PushSink<'a> {
    pub(crate) fn new(session: &'a mut Session, server_name: &'a str) -> Self {
        Self {
            session,
            server_name,
        }
    }

    pub fn request(&self) -> Option<&RequestHead> {
        self.session.request()
    }

    /// Writes a 200 header without a length; the stream ends when the
    /// connection closes.
    pub fn start_stream(&mut self, content_type: &str) -> Result<(), WebError> {
        if self.session.flags.header_sent {
            return Ok(());
        }
        let version = self
            .session
            .request()
            .map_or(Version::Http11, |r| r.version);
        let head = ResponseBuilder::new(StatusCode::Ok)
            .version(version)
            .date(SystemTime::now())
            .server(self.server_name)
            .content_type(content_type)
            .connection(false)
            .build()
            .encode()?;
        self.session.emit_header(&head);
        self.session.flags.header_sent = true;
        Ok(())
    }

    /// Starts an `application/octet-stream` stream unless a header was
    /// already written.
    pub(crate) fn ensure_header(&mut self) -> Result<(), WebError> {
        self.start_stream(DEFAULT_STREAM_TYPE)
    }

    /// Body bytes. A stream that was never started gets the default header
    /// first.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), WebError> {
        self.ensure_header()?;
        self.session.emit(bytes);
        Ok(())
    }

    pub fn put_str(&mut self, text: &str) -> Result<(), WebError> {
        self.write(text.as_bytes())
    }

    pub fn put_long(&mut self, value: i64) -> Result<(), WebError> {
        self.write(value.to_string().as_bytes())
    }
}

const DEFAULT_STREAM_TYPE: &str = "application/octet-stream";

pub(crate) type PushFactory = Box<dyn FnMut(&RequestHead) -> Box<dyn PushProducer>>;

/// Registered dynamic routes.
#[derive(Default)]
pub(crate) struct Hooks {
    pub(crate) exec: Option<Box<dyn ExecHook>>,
    exec_paths: Vec<String>,
    push: Vec<(String, PushFactory)>,
}

impl Hooks {
    pub(crate) fn bind_exec(&mut self, path: String) {
        if !self.exec_paths.contains(&path) {
            self.exec_paths.push(path);
        }
    }

    pub(crate) fn bind_push(&mut self, path: String, factory: PushFactory) {
        self.push.retain(|(p, _)| *p != path);
        self.push.push((path, factory));
    }

    pub(crate) fn is_exec(&self, path: &str) -> bool {
        self.exec_paths.iter().any(|p| p == path)
    }

    pub(crate) fn start_push(&mut self, head: &RequestHead) -> Option<Box<dyn PushProducer>> {
        self.push
            .iter_mut()
            .find(|(p, _)| *p == head.path)
            .map(|(_, factory)| factory(head))
    }
}
