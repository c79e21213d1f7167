use std::net::Ipv4Addr;

use microweb::error::WebError;
use microweb::http::form::Form;

#[test]
fn test_parse_in_order() {
    let form = Form::parse(b"name=Alice&age=30", 8).unwrap();
    let pairs: Vec<_> = form.pairs().collect();
    assert_eq!(pairs, vec![("name", "Alice"), ("age", "30")]);
    assert_eq!(form.len(), 2);
}

#[test]
fn test_url_decoding() {
    let form = Form::parse(b"msg=hello+world%21&path=%2Fetc%2Fhosts", 8).unwrap();
    assert_eq!(form.value("msg"), Some("hello world!"));
    assert_eq!(form.value("path"), Some("/etc/hosts"));
}

#[test]
fn test_value_split_on_first_equals() {
    let form = Form::parse(b"expr=a=b&flag", 8).unwrap();
    assert_eq!(form.value("expr"), Some("a=b"));
    assert_eq!(form.value("flag"), Some(""));
}

#[test]
fn test_last_match_wins() {
    let form = Form::parse(b"mode=a&mode=b", 8).unwrap();
    assert_eq!(form.value("mode"), Some("b"));
    assert_eq!(form.value("missing"), None);
}

#[test]
fn test_too_many_params() {
    assert!(matches!(
        Form::parse(b"a=1&b=2&c=3", 2),
        Err(WebError::BadParam(_))
    ));
    assert!(Form::parse(b"a=1&b=2", 2).is_ok());
}

#[test]
fn test_int_lookup() {
    let form = Form::parse(b"n=42&neg=-7&bad=4x", 8).unwrap();
    assert_eq!(form.int("n").unwrap(), Some(42));
    assert_eq!(form.int("neg").unwrap(), Some(-7));
    assert_eq!(form.int("none").unwrap(), None);
    assert!(matches!(form.int("bad"), Err(WebError::Format(_))));
}

#[test]
fn test_bool_lookup() {
    let form = Form::parse(b"a=on&b=off&c=TRUE&d=0&e=maybe", 8).unwrap();
    assert!(form.bool("a").unwrap());
    assert!(!form.bool("b").unwrap());
    assert!(form.bool("c").unwrap());
    assert!(!form.bool("d").unwrap());
    assert!(!form.bool("unchecked").unwrap());
    assert!(matches!(form.bool("e"), Err(WebError::Format(_))));
}

#[test]
fn test_ipaddr_lookup() {
    let form = Form::parse(b"ip=192.168.1.20&bad=300.1.1.1", 8).unwrap();
    assert_eq!(form.ipaddr("ip").unwrap(), Some(Ipv4Addr::new(192, 168, 1, 20)));
    assert_eq!(form.ipaddr("gw").unwrap(), None);
    assert!(matches!(form.ipaddr("bad"), Err(WebError::Format(_))));
}

#[test]
fn test_matches_browser_encoding() {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("ssid", "Home Net & Co")
        .append_pair("key", "p@ss=word")
        .finish();
    let form = Form::parse(encoded.as_bytes(), 8).unwrap();
    let pairs: Vec<_> = form.pairs().collect();
    assert_eq!(pairs, vec![("ssid", "Home Net & Co"), ("key", "p@ss=word")]);
}

#[test]
fn test_empty_body() {
    let form = Form::parse(b"", 8).unwrap();
    assert!(form.is_empty());
}
