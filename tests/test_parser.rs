use microweb::error::WebError;
use microweb::http::parser::{
    MAX_URI_LEN, arg_copy, arg_term, getline, next_arg, parse_command, parse_request_head,
};
use microweb::http::request::{Method, Version};

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, consumed) = parse_request_head(req).unwrap().unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, Version::Http11);
    assert_eq!(parsed.host.as_deref(), Some("example.com"));
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_post_request_leaves_body() {
    let req = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let (parsed, consumed) = parse_request_head(req).unwrap().unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.content_length, Some(5));
    assert_eq!(&req[consumed..], b"hello");
}

#[test]
fn test_parse_request_with_query_string() {
    let req = b"GET /search?q=rust&page=2 HTTP/1.0\r\n\r\n";
    let (parsed, _) = parse_request_head(req).unwrap().unwrap();

    assert_eq!(parsed.path, "/search");
    assert_eq!(parsed.query.as_deref(), Some("q=rust&page=2"));
    assert_eq!(parsed.version, Version::Http10);
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    assert!(parse_request_head(req).unwrap().is_none());
}

#[test]
fn test_unknown_command_is_not_an_error() {
    let req = b"BREW /pot HTTP/1.1\r\n\r\n";
    let (parsed, _) = parse_request_head(req).unwrap().unwrap();
    assert_eq!(parsed.method, Method::Unrecognized);
    assert_eq!(parse_command("DELETE /x HTTP/1.1"), Method::Unrecognized);
    assert_eq!(parse_command("PUT /x HTTP/1.1"), Method::PUT);
}

#[test]
fn test_parse_missing_target_is_client_error() {
    let result = parse_request_head(b"GET\r\n\r\n");
    assert!(matches!(result, Err(WebError::Client(_))));
}

#[test]
fn test_parse_bad_version_is_format_error() {
    let result = parse_request_head(b"GET / HTTP/2.0\r\n\r\n");
    assert!(matches!(result, Err(WebError::Format(_))));
}

#[test]
fn test_parse_relative_path_is_rejected() {
    let result = parse_request_head(b"GET index.html HTTP/1.1\r\n\r\n");
    assert!(matches!(result, Err(WebError::Client(_))));
}

#[test]
fn test_parse_overlong_uri_is_bad_param() {
    let req = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(MAX_URI_LEN));
    let result = parse_request_head(req.as_bytes());
    assert!(matches!(result, Err(WebError::BadParam(_))));
}

#[test]
fn test_post_with_invalid_content_length() {
    let result = parse_request_head(b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n");
    assert!(matches!(result, Err(WebError::Format(_))));

    let (get, _) = parse_request_head(b"GET / HTTP/1.1\r\nContent-Length: ten\r\n\r\n")
        .unwrap()
        .unwrap();
    assert_eq!(get.content_length, None);
}

#[test]
fn test_getline_is_case_insensitive_and_trims() {
    let text = "GET / HTTP/1.1\r\nhost:   example.com  \r\nREFERER: /from";
    assert_eq!(getline("Host", text), Some("example.com"));
    assert_eq!(getline("Referer", text), Some("/from"));
    assert_eq!(getline("Authorization", text), None);
}

#[test]
fn test_getline_skips_request_line() {
    let text = "GET /Host:x HTTP/1.1\r\nAccept: */*";
    assert_eq!(getline("GET /Host", text), None);
}

#[test]
fn test_request_metadata_fields() {
    let req = b"GET /admin HTTP/1.1\r\nReferer: /index.html\r\nAuthorization: Basic dXNlcjpwdw==\r\nConnection: close\r\n\r\n";
    let (parsed, _) = parse_request_head(req).unwrap().unwrap();
    assert_eq!(parsed.referer.as_deref(), Some("/index.html"));
    assert_eq!(parsed.authorization.as_deref(), Some("Basic dXNlcjpwdw=="));
    assert!(!parsed.keep_alive());
}

#[test]
fn test_arg_helpers() {
    assert_eq!(arg_term("name=value", &['=']), "name");
    assert_eq!(arg_term("plain", &['=']), "plain");

    let (first, rest) = next_arg("a,b,,c", &[',']).unwrap();
    assert_eq!((first, rest), ("a", "b,,c"));
    let (second, rest) = next_arg(rest, &[',']).unwrap();
    assert_eq!((second, rest), ("b", ",c"));
    let (third, rest) = next_arg(rest, &[',']).unwrap();
    assert_eq!((third, rest), ("c", ""));
    assert!(next_arg(rest, &[',']).is_none());
}

#[test]
fn test_arg_copy_refuses_to_truncate() {
    let mut small = [0u8; 4];
    assert_eq!(arg_copy(&mut small, "abcd").unwrap(), 4);
    assert_eq!(&small, b"abcd");
    assert!(matches!(arg_copy(&mut small, "abcde"), Err(WebError::BadParam(_))));
}
