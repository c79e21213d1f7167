mod common;

use common::{MockNet, run, single_reply, test_config};
use microweb::config::Config;
use microweb::error::WebError;
use microweb::fs::MemoryFileSystem;
use microweb::server::{ExecContext, Server};

fn fetch(config: Config, fs: MemoryFileSystem, path: &str) -> common::Reply {
    let net = MockNet::new();
    let mut server = Server::new(config, net.clone(), fs);
    let conn = net.connect();
    net.send(conn, format!("GET {} HTTP/1.1\r\n\r\n", path));
    run(&mut server, 60);
    single_reply(&net, conn)
}

#[test]
fn test_include_file_and_virtual() {
    let fs = MemoryFileSystem::new()
        .with_file(
            "/docs/index.html",
            "<!--#include file=\"head.html\" --><p>body</p><!--#include virtual=\"/foot.html\" -->",
        )
        .with_file("/docs/head.html", "<h1>Title</h1>")
        .with_file("/foot.html", "<footer/>");
    let reply = fetch(test_config(), fs, "/docs/index.html");

    assert_eq!(reply.status, 200);
    assert_eq!(reply.body_text(), "<h1>Title</h1><p>body</p><footer/>");
    assert_eq!(
        reply.header("Content-Length"),
        Some(reply.body.len().to_string().as_str())
    );
}

#[test]
fn test_echo_variables() {
    let fs = MemoryFileSystem::new().with_file(
        "/page.html",
        "uri=<!--#echo var=\"DOCUMENT_URI\" --> q=<!--#echo var=\"QUERY_STRING\" --> s=<!--#echo var=\"SERVER_NAME\" -->",
    );
    let reply = fetch(test_config(), fs, "/page.html?x=1");
    assert_eq!(reply.body_text(), "uri=/page.html q=x=1 s=microweb/test");
}

#[test]
fn test_date_echo_is_rfc1123() {
    let fs = MemoryFileSystem::new().with_file("/d.html", "<!--#echo var=\"DATE_GMT\" -->");
    let reply = fetch(test_config(), fs, "/d.html");
    assert!(reply.body_text().ends_with(" GMT"));
}

#[test]
fn test_directive_split_across_reads() {
    let config = Config {
        content_quantum: 7,
        ..test_config()
    };
    let fs = MemoryFileSystem::new()
        .with_file("/a.html", "before <!--#include file=\"b.html\" --> after")
        .with_file("/b.html", "[B]");
    let reply = fetch(config, fs, "/a.html");
    assert_eq!(reply.body_text(), "before [B] after");
}

#[test]
fn test_include_depth_is_bounded() {
    let config = Config {
        max_include_depth: 3,
        ..test_config()
    };
    let fs = MemoryFileSystem::new().with_file("/loop.html", "x<!--#include file=\"loop.html\" -->y");
    let reply = fetch(config, fs, "/loop.html");
    assert_eq!(reply.body_text(), "xxxyyy");
}

#[test]
fn test_missing_include_is_skipped() {
    let fs = MemoryFileSystem::new()
        .with_file("/p.html", "a<!--#include file=\"gone.html\" -->b");
    let reply = fetch(test_config(), fs, "/p.html");
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body_text(), "ab");
}

#[test]
fn test_unterminated_marker_is_literal() {
    let fs = MemoryFileSystem::new().with_file("/u.html", "x <!--#include file=\"a");
    let reply = fetch(test_config(), fs, "/u.html");
    assert_eq!(reply.body_text(), "x <!--#include file=\"a");
}

#[test]
fn test_plain_comments_pass_through() {
    let fs = MemoryFileSystem::new().with_file("/c.html", "<!-- note --><b>ok</b>");
    let reply = fetch(test_config(), fs, "/c.html");
    assert_eq!(reply.body_text(), "<!-- note --><b>ok</b>");
}

#[test]
fn test_exec_directive_inlines_output() {
    let fs = MemoryFileSystem::new()
        .with_file("/status.html", "<p>Temp: <!--#exec cgi=\"temp celsius\" --></p>");
    let net = MockNet::new();
    let mut server = Server::new(test_config(), net.clone(), fs);
    server.set_exec_hook(
        |cx: &mut ExecContext<'_>, args: &str| -> Result<u16, WebError> {
            assert_eq!(args, "temp celsius");
            cx.put_long(21);
            cx.set_content_type("text/plain");
            Ok(200)
        },
    );
    let conn = net.connect();
    net.send(conn, "GET /status.html HTTP/1.1\r\n\r\n");
    run(&mut server, 20);

    let reply = single_reply(&net, conn);
    assert_eq!(reply.body_text(), "<p>Temp: 21</p>");
    // The page type was fixed when it was opened.
    assert_eq!(reply.header("Content-Type"), Some("text/html"));
}

#[test]
fn test_binary_files_are_not_scanned() {
    let fs = MemoryFileSystem::new().with_file("/raw.bin", "<!--#echo var=\"SERVER_NAME\" -->");
    let reply = fetch(test_config(), fs, "/raw.bin");
    assert_eq!(reply.body_text(), "<!--#echo var=\"SERVER_NAME\" -->");
}

#[test]
fn test_large_page_spans_many_segments() {
    let part = "0123456789".repeat(40);
    let fs = MemoryFileSystem::new()
        .with_file("/big.html", format!("{0}<!--#include file=\"part.html\" -->{0}", part))
        .with_file("/part.html", part.clone());
    let reply = fetch(test_config(), fs, "/big.html");
    assert_eq!(reply.body.len(), 1200);
    assert_eq!(reply.header("Content-Length"), Some("1200"));
}
