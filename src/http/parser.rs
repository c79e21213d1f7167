//! Stateless helpers over raw header text and argument strings.
//!
//! Nothing in here keeps state between calls; the session engine feeds the
//! input buffer to [`parse_request_head`] every time new bytes arrive.

use crate::error::WebError;
use crate::http::request::{Method, RequestHead, Version};

/// Longest request path accepted, in bytes.
pub const MAX_URI_LEN: usize = 256;

/// Returns the value of the header line named `name`, if present.
///
/// `header_text` is the raw header block; the request line is skipped. Names
/// are compared ASCII case-insensitively and the value is trimmed.
pub fn getline<'a>(name: &str, header_text: &'a str) -> Option<&'a str> {
    header_text
        .split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

/// Splits the next argument off a delimited list.
///
/// Leading delimiters are skipped. Returns the argument and the text after
/// its terminating delimiter, or `None` when nothing but delimiters is left.
pub fn next_arg<'a>(text: &'a str, delims: &[char]) -> Option<(&'a str, &'a str)> {
    let text = text.trim_start_matches(|c| delims.contains(&c));
    if text.is_empty() {
        return None;
    }
    let arg = arg_term(text, delims);
    let rest = &text[arg.len()..];
    let rest = rest
        .chars()
        .next()
        .map_or(rest, |c| &rest[c.len_utf8()..]);
    Some((arg, rest))
}

/// Returns `text` up to (not including) the first delimiter.
pub fn arg_term<'a>(text: &'a str, delims: &[char]) -> &'a str {
    match text.find(|c| delims.contains(&c)) {
        Some(end) => &text[..end],
        None => text,
    }
}

/// Copies `arg` into a caller-sized buffer, returning the byte count.
///
/// Fails with `BadParam` instead of truncating when `dst` is too small.
pub fn arg_copy(dst: &mut [u8], arg: &str) -> Result<usize, WebError> {
    let bytes = arg.as_bytes();
    if bytes.len() > dst.len() {
        return Err(WebError::BadParam("argument does not fit destination"));
    }
    dst[..bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}

/// Decodes the command token of a request line.
pub fn parse_command(line: &str) -> Method {
    next_arg(line, &[' '])
        .map(|(token, _)| Method::from_token(token))
        .unwrap_or(Method::Unrecognized)
}

pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parses the request line and header block at the start of `buf`.
///
/// Returns `Ok(None)` while the blank line ending the header block has not
/// arrived yet, otherwise the parsed head and the number of bytes consumed
/// (the body, if any, starts right after).
pub fn parse_request_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>, WebError> {
    let Some(end) = find_headers_end(buf) else {
        return Ok(None);
    };
    let header_text = std::str::from_utf8(&buf[..end])
        .map_err(|_| WebError::Client("header is not valid UTF-8"))?;

    let request_line = header_text.split("\r\n").next().unwrap_or("");
    let method = parse_command(request_line);
    let (_, rest) =
        next_arg(request_line, &[' ']).ok_or(WebError::Client("empty request line"))?;
    let (target, rest) = next_arg(rest, &[' ']).ok_or(WebError::Client("missing request target"))?;
    let version = next_arg(rest, &[' '])
        .and_then(|(token, _)| Version::from_token(token))
        .ok_or(WebError::Format("unsupported HTTP version"))?;

    let path = arg_term(target, &['?']);
    let mut uri = [0u8; MAX_URI_LEN];
    let len = arg_copy(&mut uri, path)?;
    let path = std::str::from_utf8(&uri[..len])
        .map_err(|_| WebError::Client("request path is not valid UTF-8"))?;
    if !path.starts_with('/') {
        return Err(WebError::Client("request path must be absolute"));
    }
    let query = target.split_once('?').map(|(_, q)| q.to_string());

    let content_length = match getline("Content-Length", header_text) {
        None => None,
        Some(value) => match value.parse::<usize>() {
            Ok(len) => Some(len),
            Err(_) if method == Method::POST => {
                return Err(WebError::Format("invalid Content-Length"));
            }
            Err(_) => {
                tracing::debug!(value, "ignoring unparsable Content-Length");
                None
            }
        },
    };

    let head = RequestHead {
        method,
        path: path.to_string(),
        query,
        version,
        referer: getline("Referer", header_text).map(str::to_string),
        authorization: getline("Authorization", header_text).map(str::to_string),
        host: getline("Host", header_text).map(str::to_string),
        content_length,
        connection: getline("Connection", header_text).map(str::to_string),
    };

    Ok(Some((head, end + 4)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_arg_skips_repeated_delimiters() {
        let (arg, rest) = next_arg("  GET   /x HTTP/1.1", &[' ']).unwrap();
        assert_eq!(arg, "GET");
        assert_eq!(rest, "  /x HTTP/1.1");
        assert_eq!(next_arg("   ", &[' ']), None);
    }

    #[test]
    fn parse_simple_get() {
        let req = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (head, consumed) = parse_request_head(req).unwrap().unwrap();
        assert_eq!(head.method, Method::GET);
        assert_eq!(head.path, "/index.html");
        assert_eq!(head.host.as_deref(), Some("example.com"));
        assert_eq!(consumed, req.len());
    }
}
