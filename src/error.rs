//! Error kinds shared by the parser, the buffer pool and the session engine.
//!
//! Every routine that can fail returns a `WebError`; the engine decides per
//! session whether to retry, degrade or terminate. `status()` maps a kind to
//! the HTTP status sent to the client when a response is still possible.

use crate::http::response::StatusCode;
use std::{error, fmt, io};

#[derive(Debug)]
pub enum WebError {
    /// Transport failure. Fatal to the session, never to the server.
    Socket(io::Error),
    /// Buffer pool exhausted.
    Memory,
    /// Malformed input from the peer.
    Client(&'static str),
    /// Requested file does not exist.
    NoFile,
    /// I/O error while reading a file.
    BadFile(io::Error),
    /// Invalid argument passed to a parsing routine.
    BadParam(&'static str),
    /// Bad HTTP or HTML format.
    Format(&'static str),
    /// Access to the resource is not permitted.
    Permission,
}

impl WebError {
    /// Status code used when this error is answered with an error page.
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::NoFile => StatusCode::NotFound,
            WebError::Permission => StatusCode::Forbidden,
            WebError::Client(_) | WebError::BadParam(_) | WebError::Format(_) => {
                StatusCode::BadRequest
            }
            WebError::Memory | WebError::BadFile(_) | WebError::Socket(_) => {
                StatusCode::InternalServerError
            }
        }
    }
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Socket(e) => write!(f, "socket error: {}", e),
            WebError::Memory => write!(f, "transmit buffer pool exhausted"),
            WebError::Client(why) => write!(f, "client error: {}", why),
            WebError::NoFile => write!(f, "file not found"),
            WebError::BadFile(e) => write!(f, "file I/O error: {}", e),
            WebError::BadParam(why) => write!(f, "invalid parameter: {}", why),
            WebError::Format(why) => write!(f, "bad format: {}", why),
            WebError::Permission => write!(f, "permission denied"),
        }
    }
}

impl error::Error for WebError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            WebError::Socket(e) | WebError::BadFile(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WebError {
    fn from(err: io::Error) -> Self {
        WebError::Socket(err)
    }
}
