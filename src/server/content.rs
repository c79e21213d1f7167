//! Response assembly for the CONTENT state.
//!
//! Each call to [`produce`] does a bounded amount of work: choose the route,
//! read one quantum from the include stack, or finish the response by
//! placing a deferred header in front of the body. Generated responses (error
//! pages, redirects) are complete in one call.
//!
//! Text output stays staged until its length is known, so the header never
//! competes with its own body for transmit segments. A body that outgrows
//! `max_deferred_body` is committed to a streamed response instead.

use std::time::SystemTime;

use crate::config::Config;
use crate::error::WebError;
use crate::fs::FileSystem;
use crate::http::mime;
use crate::http::request::{Method, RequestHead, Version};
use crate::http::response::{HttpDate, ResponseBuilder, StatusCode, error_page, redirect_page};
use crate::http::writer;
use crate::server::dynamic::{ExecContext, Hooks};
use crate::server::include::{self, Directive, FileContext};
use crate::server::pool::BufferPool;
use crate::server::session::{Production, Session, SessionState};

use bytes::BytesMut;

/// Server-owned collaborators a session borrows while producing content.
pub(crate) struct Cx<'a> {
    pub(crate) pool: &'a mut BufferPool,
    pub(crate) fs: &'a mut dyn FileSystem,
    pub(crate) hooks: &'a mut Hooks,
    pub(crate) config: &'a Config,
}

enum Action {
    Pop,
    Emit(BytesMut),
    Directive(BytesMut, String),
}

/// Advances content production by one unit of work.
///
/// Only `Memory` is returned, meaning the step was blocked on the pool;
/// every other failure is answered here.
pub(crate) fn produce(cx: &mut Cx<'_>, session: &mut Session) -> Result<(), WebError> {
    let result = match session.production {
        Production::Open => open(cx, session),
        Production::Files => produce_files(cx, session),
        Production::Finish => finish(cx, session),
    };
    match result {
        Err(WebError::Memory) => Err(WebError::Memory),
        Err(e) => {
            fail(cx, session, e);
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

fn base_head(config: &Config, session: &Session, status: StatusCode) -> ResponseBuilder {
    let version = session.request().map_or(Version::Http11, |r| r.version);
    ResponseBuilder::new(status)
        .version(version)
        .date(SystemTime::now())
        .server(&config.server_name)
}

fn open(cx: &mut Cx<'_>, session: &mut Session) -> Result<(), WebError> {
    if let Some(status) = session.pending_error.take() {
        senderr(cx, session, status);
        return Ok(());
    }
    let Some(request) = session.request.clone() else {
        senderr(cx, session, StatusCode::BadRequest);
        return Ok(());
    };
    session.status = StatusCode::Ok;

    if let Some(producer) = cx.hooks.start_push(&request) {
        tracing::debug!(session = ?session.id(), path = %request.path, "Starting push stream");
        session.push = Some(producer);
        session.flags.server_push = true;
        session.flags.persist = false;
        session.set_state(SessionState::Pushing);
        return Ok(());
    }

    if cx.hooks.is_exec(&request.path) {
        return exec_route(cx, session, &request);
    }

    if request.method == Method::PUT {
        senderr(cx, session, StatusCode::MethodNotAllowed);
        return Ok(());
    }

    let path = if request.path.ends_with('/') {
        format!("{}{}", request.path, cx.config.default_page)
    } else {
        request.path.clone()
    };
    let (mime, binary) = mime::content_type(&path);
    session.mime = Some(mime);
    session.flags.binary = binary;

    let file = match cx.fs.open(&path) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(session = ?session.id(), path = %path, error = %e, "Cannot open content");
            senderr(cx, session, e.status());
            return Ok(());
        }
    };

    // Binary content of known length streams behind its header right away.
    let known_len = file.len().and_then(|len| usize::try_from(len).ok());
    if let (true, Some(len)) = (binary, known_len) {
        let head = base_head(cx.config, session, StatusCode::Ok)
            .content_type(mime)
            .content_length(len)
            .connection(session.flags.persist)
            .build()
            .encode()?;
        session.emit_header(&head);
        session.flags.header_sent = true;
    }

    tracing::debug!(session = ?session.id(), path = %path, mime, binary, "Opened content");
    session.files.push(FileContext::new(path, file));
    session.production = Production::Files;
    Ok(())
}

/// Reads and scans at most one quantum from the include stack.
fn produce_files(cx: &mut Cx<'_>, session: &mut Session) -> Result<(), WebError> {
    let mut budget = cx.config.content_quantum;
    loop {
        let binary = session.flags.binary;
        let action = {
            let Some(top) = session.files.top_mut() else {
                session.production = Production::Finish;
                return Ok(());
            };
            if top.pending.is_empty() {
                if top.is_eof() {
                    Action::Pop
                } else if budget == 0 {
                    return Ok(());
                } else {
                    budget -= top.fill(budget)?;
                    continue;
                }
            } else if binary {
                Action::Emit(top.pending.split())
            } else {
                let scan = include::scan(&top.pending, top.is_eof());
                let literal = top.pending.split_to(scan.literal);
                match scan.directive {
                    Some((body, len)) => {
                        let _ = top.pending.split_to(len);
                        Action::Directive(literal, body)
                    }
                    None if literal.is_empty() => {
                        if budget == 0 {
                            return Ok(());
                        }
                        budget -= top.fill(budget)?;
                        continue;
                    }
                    None => Action::Emit(literal),
                }
            }
        };

        match action {
            Action::Pop => {
                if let Some(done) = session.files.pop() {
                    tracing::trace!(session = ?session.id(), path = done.path(), "Closed content file");
                }
            }
            Action::Emit(bytes) => session.emit(&bytes),
            Action::Directive(literal, body) => {
                session.emit(&literal);
                directive(cx, session, &body);
            }
        }
    }
}

fn directive(cx: &mut Cx<'_>, session: &mut Session, body: &str) {
    match include::parse_directive(body) {
        Directive::IncludeFile(target) => include_file(cx, session, &target, false),
        Directive::IncludeVirtual(target) => include_file(cx, session, &target, true),
        Directive::Exec(args) => match run_hook(cx, session, &args) {
            None => tracing::warn!(session = ?session.id(), "SSI exec without an exec hook"),
            Some((Ok(200), None)) => {}
            Some((Ok(code), _)) => {
                tracing::warn!(session = ?session.id(), args = %args, code, "SSI exec returned non-200")
            }
            Some((Err(e), _)) => {
                tracing::warn!(session = ?session.id(), args = %args, error = %e, "SSI exec failed")
            }
        },
        Directive::Echo(var) => echo(cx, session, &var),
        Directive::Unknown(what) => {
            tracing::warn!(session = ?session.id(), directive = %what, "Unknown SSI directive")
        }
    }
}

fn include_file(cx: &mut Cx<'_>, session: &mut Session, target: &str, is_virtual: bool) {
    if session.files.depth() >= cx.config.max_include_depth {
        tracing::warn!(
            session = ?session.id(),
            include = %target,
            depth = session.files.depth(),
            "SSI include nested too deep, skipped"
        );
        return;
    }
    let current = session.files.top().map_or("/", |f| f.path()).to_string();
    let path = match include::resolve(&current, target, is_virtual) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(session = ?session.id(), include = %target, error = %e, "SSI include skipped");
            return;
        }
    };
    match cx.fs.open(&path) {
        Ok(file) => {
            tracing::trace!(session = ?session.id(), path = %path, "Entering include");
            session.files.push(FileContext::new(path, file));
        }
        Err(e) => {
            tracing::warn!(session = ?session.id(), path = %path, error = %e, "SSI include skipped")
        }
    }
}

fn echo(cx: &mut Cx<'_>, session: &mut Session, var: &str) {
    let value = match var {
        "DOCUMENT_URI" => session.request().map(|r| r.path.clone()).unwrap_or_default(),
        "QUERY_STRING" => session
            .request()
            .and_then(|r| r.query.clone())
            .unwrap_or_default(),
        "SERVER_NAME" => cx.config.server_name.clone(),
        "DATE_GMT" => HttpDate(SystemTime::now()).to_string(),
        _ => {
            tracing::warn!(session = ?session.id(), var, "Unknown SSI echo variable");
            return;
        }
    };
    session.emit(value.as_bytes());
}

type HookOutcome = (Result<u16, WebError>, Option<String>);

fn run_hook(cx: &mut Cx<'_>, session: &mut Session, args: &str) -> Option<HookOutcome> {
    let hook = cx.hooks.exec.as_mut()?;
    let mut ecx = ExecContext::new(session);
    let result = hook.exec(&mut ecx, args);
    let location = ecx.location.take();
    Some((result, location))
}

fn exec_route(cx: &mut Cx<'_>, session: &mut Session, request: &RequestHead) -> Result<(), WebError> {
    let args = request.query.clone().unwrap_or_default();
    match run_hook(cx, session, &args) {
        None => {
            tracing::error!(session = ?session.id(), path = %request.path, "Exec route bound without an exec hook");
            senderr(cx, session, StatusCode::InternalServerError);
        }
        Some((Ok(_), Some(location))) => redirect(cx, session, &location),
        Some((Ok(200), None)) => session.production = Production::Finish,
        Some((Ok(code), None)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::InternalServerError);
            senderr(cx, session, status);
        }
        Some((Err(e), _)) => {
            tracing::warn!(session = ?session.id(), path = %request.path, error = %e, "Exec hook failed");
            senderr(cx, session, e.status());
        }
    }
    Ok(())
}

/// Adds the deferred header, if any, and hands the response to SENDDATA.
fn finish(cx: &mut Cx<'_>, session: &mut Session) -> Result<(), WebError> {
    if !session.flags.header_sent {
        let head = base_head(cx.config, session, session.status)
            .content_type(session.mime.unwrap_or("text/html"))
            .content_length(session.content_len)
            .connection(session.flags.persist)
            .build()
            .encode()?;
        session.prepend_header(&head);
        session.flags.header_sent = true;
    }
    tracing::info!(
        session = ?session.id(),
        path = session.request().map_or("-", |r| r.path.as_str()),
        status = session.status.as_u16(),
        length = session.content_len,
        "Response queued"
    );
    session.set_state(SessionState::SendData);
    Ok(())
}

/// Sends the header of a deferred response that grew past
/// `max_deferred_body`. Without a length the body ends when the connection
/// closes.
pub(crate) fn commit_stream(cx: &mut Cx<'_>, session: &mut Session) {
    session.flags.persist = false;
    let head = base_head(cx.config, session, session.status)
        .content_type(session.mime.unwrap_or("text/html"))
        .connection(false)
        .build()
        .encode();
    match head {
        Ok(head) => {
            tracing::debug!(
                session = ?session.id(),
                buffered = session.staging.len(),
                "Response too long to defer, streaming without a length"
            );
            session.prepend_header(&head);
            session.flags.header_sent = true;
        }
        Err(e) => {
            tracing::error!(session = ?session.id(), error = %e, "Cannot encode response header");
            session.set_state(SessionState::Ending);
        }
    }
}

/// Drops whatever the current response has produced so far.
fn discard(pool: &mut BufferPool, session: &mut Session) {
    session.staging.clear();
    writer::release_all(pool, &mut session.txq);
    session.files.clear();
    session.content_len = 0;
}

fn respond(cx: &mut Cx<'_>, session: &mut Session, head: ResponseBuilder, status: StatusCode, body: &str) {
    let head = head
        .content_type("text/html")
        .content_length(body.len())
        .connection(session.flags.persist);
    match head.build().encode() {
        Ok(head) => {
            session.emit_header(&head);
            session.emit(body.as_bytes());
            session.flags.header_sent = true;
            session.status = status;
            session.production = Production::Finish;
        }
        Err(e) => {
            tracing::error!(session = ?session.id(), error = %e, "Cannot encode response header");
            session.set_state(SessionState::Ending);
        }
    }
}

/// Answers with an HTML error page.
///
/// Once a header has been queued there is no way to change the response, so
/// the session is closed instead.
pub(crate) fn senderr(cx: &mut Cx<'_>, session: &mut Session, status: StatusCode) {
    if session.flags.header_sent {
        tracing::warn!(
            session = ?session.id(),
            status = status.as_u16(),
            "Error after header was queued, closing"
        );
        session.set_state(SessionState::Ending);
        return;
    }
    discard(cx.pool, session);
    if !status.keeps_connection() {
        session.flags.persist = false;
    }
    tracing::info!(session = ?session.id(), status = status.as_u16(), "Sending error page");
    let body = error_page(status, &cx.config.server_name);
    let head = base_head(cx.config, session, status);
    respond(cx, session, head, status, &body);
}

/// Answers with a 302 to `location`.
pub(crate) fn redirect(cx: &mut Cx<'_>, session: &mut Session, location: &str) {
    if session.flags.header_sent {
        tracing::warn!(session = ?session.id(), location, "Redirect after header was queued, closing");
        session.set_state(SessionState::Ending);
        return;
    }
    discard(cx.pool, session);
    tracing::info!(session = ?session.id(), location, "Redirecting");
    let body = redirect_page(location);
    let head = base_head(cx.config, session, StatusCode::Found).location(location);
    respond(cx, session, head, StatusCode::Found, &body);
}

/// Answers a failure raised while producing content.
pub(crate) fn fail(cx: &mut Cx<'_>, session: &mut Session, err: WebError) {
    if let WebError::Socket(e) = &err {
        tracing::debug!(session = ?session.id(), error = %e, "Socket error");
        session.set_state(SessionState::Ending);
        return;
    }
    tracing::warn!(session = ?session.id(), error = %err, "Content production failed");
    senderr(cx, session, err.status());
}

/// Gives up on a session that could not get a single transmit segment for
/// too long. Its header is already staged, so the response cannot change.
pub(crate) fn exhausted(cx: &mut Cx<'_>, session: &mut Session) {
    session.alloc_failures = 0;
    tracing::warn!(
        session = ?session.id(),
        free = cx.pool.available(),
        "Out of transmit buffers, closing"
    );
    discard(cx.pool, session);
    session.set_state(SessionState::Ending);
}
