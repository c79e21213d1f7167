//! Include stack and server-side include scanning.
//!
//! The head of the stack is the file currently producing content. Bytes read
//! from a file land in its `pending` buffer; the scanner splits them into
//! literal output and directives. Whatever follows a directive stays pending
//! on the parent while an included child runs, so the child's content comes
//! out first.

use bytes::BytesMut;

use crate::error::WebError;
use crate::fs::ContentFile;
use crate::http::parser::{MAX_URI_LEN, arg_copy, arg_term, next_arg};

const OPEN: &[u8] = b"<!--#";
const CLOSE: &[u8] = b"-->";

/// Markers longer than this are passed through as text.
pub const MAX_DIRECTIVE_LEN: usize = 256;

pub struct FileContext {
    file: Box<dyn ContentFile>,
    path: String,
    pub(crate) pending: BytesMut,
    eof: bool,
}

impl FileContext {
    pub fn new(path: impl Into<String>, file: Box<dyn ContentFile>) -> Self {
        Self {
            file,
            path: path.into(),
            pending: BytesMut::new(),
            eof: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Reads up to `max` more bytes into `pending`.
    pub fn fill(&mut self, max: usize) -> Result<usize, WebError> {
        if self.eof || max == 0 {
            return Ok(0);
        }
        let start = self.pending.len();
        self.pending.resize(start + max, 0);
        let result = self.file.read(&mut self.pending[start..]);
        let n = *result.as_ref().unwrap_or(&0);
        self.pending.truncate(start + n);
        if n == 0 {
            self.eof = true;
        }
        result
    }
}

#[derive(Default)]
pub struct IncludeStack {
    frames: Vec<FileContext>,
}

impl IncludeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ctx: FileContext) {
        self.frames.push(ctx);
    }

    /// Drops the active file, closing it.
    pub fn pop(&mut self) -> Option<FileContext> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&FileContext> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut FileContext> {
        self.frames.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `include file="x"`, relative to the including file
    IncludeFile(String),
    /// `include virtual="/x"`, a request path
    IncludeVirtual(String),
    /// `exec cgi="args"`
    Exec(String),
    /// `echo var="NAME"`
    Echo(String),
    Unknown(String),
}

/// Result of scanning a pending buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct Scan {
    /// Leading bytes to emit unchanged
    pub literal: usize,
    /// A complete marker right after the literal: its inner text and total
    /// length including the delimiters
    pub directive: Option<(String, usize)>,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `pending` into literal text and at most one directive.
///
/// Without `at_eof`, a trailing partial marker is held back so a directive
/// split across reads is reassembled. `literal == 0` with no directive means
/// more input is needed.
pub fn scan(pending: &[u8], at_eof: bool) -> Scan {
    let Some(start) = find(pending, OPEN) else {
        if at_eof {
            return Scan {
                literal: pending.len(),
                directive: None,
            };
        }
        let held = (1..OPEN.len())
            .rev()
            .find(|&k| pending.ends_with(&OPEN[..k]))
            .unwrap_or(0);
        return Scan {
            literal: pending.len() - held,
            directive: None,
        };
    };

    let body_start = start + OPEN.len();
    match find(&pending[body_start..], CLOSE) {
        Some(end) if end + OPEN.len() + CLOSE.len() <= MAX_DIRECTIVE_LEN => {
            let body = String::from_utf8_lossy(&pending[body_start..body_start + end]);
            Scan {
                literal: start,
                directive: Some((body.into_owned(), OPEN.len() + end + CLOSE.len())),
            }
        }
        // Unterminated at EOF or too long: the opener goes out as text.
        Some(_) => Scan {
            literal: body_start,
            directive: None,
        },
        None if at_eof || pending.len() - start > MAX_DIRECTIVE_LEN => Scan {
            literal: body_start,
            directive: None,
        },
        None => Scan {
            literal: start,
            directive: None,
        },
    }
}

/// Parses the inner text of a marker such as `include file="a.html" `.
pub fn parse_directive(body: &str) -> Directive {
    let Some((command, rest)) = next_arg(body, &[' ', '\t', '\r', '\n']) else {
        return Directive::Unknown(String::new());
    };
    let Some((name, value)) = next_arg(rest, &['=', ' ', '\t']) else {
        return Directive::Unknown(command.to_string());
    };
    let value = value.trim_start();
    let value = match value.strip_prefix('"') {
        Some(quoted) => arg_term(quoted, &['"']),
        None => arg_term(value, &[' ', '\t']),
    };

    match (command, name) {
        ("include", "file") => Directive::IncludeFile(value.to_string()),
        ("include", "virtual") => Directive::IncludeVirtual(value.to_string()),
        ("exec", "cgi") | ("exec", "cmd") => Directive::Exec(value.to_string()),
        ("echo", "var") => Directive::Echo(value.to_string()),
        _ => Directive::Unknown(format!("{} {}", command, name)),
    }
}

/// Request path of an include target.
///
/// `file` targets resolve against the directory of the including file.
/// Fails with `BadParam` when the result would not fit a request path.
pub fn resolve(current: &str, directive_path: &str, is_virtual: bool) -> Result<String, WebError> {
    let joined = if directive_path.starts_with('/') && is_virtual {
        directive_path.to_string()
    } else {
        let dir = current.rsplit_once('/').map_or("", |(dir, _)| dir);
        format!("{}/{}", dir, directive_path.trim_start_matches('/'))
    };
    let mut uri = [0u8; MAX_URI_LEN];
    arg_copy(&mut uri, &joined)?;
    Ok(joined)
}
