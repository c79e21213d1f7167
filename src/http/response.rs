use crate::error::WebError;
use crate::http::request::Version;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::SystemTime;

/// Upper bound for an encoded status line plus header block.
pub const HEADER_BUF_SIZE: usize = 1000;

/// HTTP status codes produced by the server.
///
/// - `Ok` (200): content served
/// - `Found` (302): redirect issued by a form handler
/// - 4xx: request rejected, see [`crate::error::WebError::status`]
/// - 5xx: server-side failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 302 Found
    Found,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 411 Length Required
    LengthRequired,
    /// 413 Payload Too Large
    PayloadTooLarge,
    /// 500 Internal Server Error
    InternalServerError,
    /// 501 Not Implemented
    NotImplemented,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use microweb::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Found => 302,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::LengthRequired => 411,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
        }
    }

    /// Inverse of [`StatusCode::as_u16`], used for codes returned by exec hooks.
    pub fn from_u16(code: u16) -> Option<Self> {
        Some(match code {
            200 => StatusCode::Ok,
            302 => StatusCode::Found,
            400 => StatusCode::BadRequest,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            411 => StatusCode::LengthRequired,
            413 => StatusCode::PayloadTooLarge,
            500 => StatusCode::InternalServerError,
            501 => StatusCode::NotImplemented,
            _ => return None,
        })
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use microweb::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Found => "Found",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::LengthRequired => "Length Required",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
        }
    }

    /// Error statuses after which the connection may serve another request.
    pub fn keeps_connection(&self) -> bool {
        matches!(self, StatusCode::NotFound | StatusCode::Forbidden)
    }
}

/// RFC 1123 formatted date for the `Date` header.
pub struct HttpDate(pub SystemTime);

impl fmt::Display for HttpDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let datetime = DateTime::<Utc>::from(self.0);
        write!(f, "{}", datetime.format("%a, %d %b %Y %H:%M:%S GMT"))
    }
}

/// Status line and header block of one response.
///
/// Headers keep insertion order so the wire output is stable.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Looks a header up by exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Encodes the head into wire format.
    ///
    /// Fails with `BadParam` rather than producing a header block larger
    /// than [`HEADER_BUF_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>, WebError> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(self.version.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.status.as_u16().to_string().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.status.reason_phrase().as_bytes());
        buf.extend_from_slice(b"\r\n");

        for (k, v) in &self.headers {
            buf.extend_from_slice(k.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(v.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"\r\n");

        if buf.len() > HEADER_BUF_SIZE {
            return Err(WebError::BadParam("response header too large"));
        }
        Ok(buf)
    }
}

/// Builder for a [`ResponseHead`] in a fluent style.
///
/// # Example
///
/// ```ignore
/// let head = ResponseBuilder::new(StatusCode::Ok)
///     .date(SystemTime::now())
///     .content_type("text/html")
///     .content_length(42)
///     .connection(true)
///     .build();
/// ```
pub struct ResponseBuilder {
    version: Version,
    status: StatusCode,
    headers: Vec<(String, String)>,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::Http11,
            status,
            headers: Vec::new(),
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((key, value)),
        }
        self
    }

    pub fn date(self, now: SystemTime) -> Self {
        self.header("Date", HttpDate(now).to_string())
    }

    pub fn server(self, name: &str) -> Self {
        self.header("Server", name)
    }

    pub fn content_type(self, mime: &str) -> Self {
        self.header("Content-Type", mime)
    }

    pub fn content_length(self, len: usize) -> Self {
        self.header("Content-Length", len.to_string())
    }

    pub fn connection(self, persist: bool) -> Self {
        self.header("Connection", if persist { "keep-alive" } else { "close" })
    }

    pub fn location(self, location: &str) -> Self {
        self.header("Location", location)
    }

    pub fn build(self) -> ResponseHead {
        ResponseHead {
            version: self.version,
            status: self.status,
            headers: self.headers,
        }
    }
}

/// Body of a generated error page.
pub fn error_page(status: StatusCode, server_name: &str) -> String {
    format!(
        "<html><head><title>{code} {reason}</title></head><body>\n\
         <h1>{reason}</h1>\n\
         <hr>\n\
         {server}\n\
         </body></html>\n",
        code = status.as_u16(),
        reason = status.reason_phrase(),
        server = server_name,
    )
}

/// Body of a generated redirect page.
pub fn redirect_page(location: &str) -> String {
    format!(
        "<html><head><title>302 Found</title></head><body>\n\
         Moved to: <a href=\"{0}\">{0}</a>\n\
         </body></html>\n",
        location
    )
}
