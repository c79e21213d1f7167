/// Request commands understood by the server.
///
/// The command line is matched against a fixed set; anything else becomes
/// `Unrecognized` and the engine decides how to answer it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit form data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// Any other command token
    Unrecognized,
}

impl Method {
    /// Parses an HTTP method from its command token.
    ///
    /// Matching is case-sensitive, as on the wire.
    ///
    /// # Example
    ///
    /// ```
    /// # use microweb::http::request::Method;
    /// assert_eq!(Method::from_token("GET"), Method::GET);
    /// assert_eq!(Method::from_token("get"), Method::Unrecognized);
    /// ```
    pub fn from_token(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            _ => Method::Unrecognized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::Unrecognized => "?",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "HTTP/1.0" => Some(Version::Http10),
            "HTTP/1.1" => Some(Version::Http11),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// Request line and the header fields the engine keeps.
///
/// Produced by [`crate::http::parser::parse_request_head`]. Header values the
/// engine does not need are not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// The command (GET, POST, ...)
    pub method: Method,
    /// Request path without the query string (e.g. "/index.html")
    pub path: String,
    /// Raw query string after `?`, if any
    pub query: Option<String>,
    pub version: Version,
    pub referer: Option<String>,
    pub authorization: Option<String>,
    pub host: Option<String>,
    /// Declared body length; `None` when the header is absent
    pub content_length: Option<usize>,
    /// Raw `Connection` header value
    pub connection: Option<String>,
}

impl RequestHead {
    /// Determines whether the connection should remain open after the response.
    ///
    /// HTTP/1.1 defaults to persistent unless `Connection: close` is sent;
    /// HTTP/1.0 is persistent only with `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        match (self.version, self.connection.as_deref()) {
            (_, Some(v)) if v.eq_ignore_ascii_case("close") => false,
            (_, Some(v)) if v.eq_ignore_ascii_case("keep-alive") => true,
            (Version::Http11, _) => true,
            (Version::Http10, _) => false,
        }
    }
}
