//! MIME type guessing from file extensions.

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// (extension, mime type, binary). Binary content is never scanned for
/// server-side includes.
const EXTENSIONS: &[(&str, &str, bool)] = &[
    ("html", "text/html", false),
    ("htm", "text/html", false),
    ("shtml", "text/html", false),
    ("txt", "text/plain", false),
    ("css", "text/css", false),
    ("js", "text/javascript", false),
    ("xml", "application/xml", false),
    ("json", "application/json", false),
    ("gif", "image/gif", true),
    ("jpg", "image/jpeg", true),
    ("jpeg", "image/jpeg", true),
    ("png", "image/png", true),
    ("ico", "image/x-icon", true),
    ("svg", "image/svg+xml", true),
    ("pdf", "application/pdf", true),
    ("zip", "application/zip", true),
    ("wasm", "application/wasm", true),
    ("class", "application/java-vm", true),
];

/// Content type of a path and whether it must be treated as binary.
///
/// Unknown extensions are served as binary `application/octet-stream`.
pub fn content_type(path: &str) -> (&'static str, bool) {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.')
        .and_then(|(_, ext)| {
            EXTENSIONS
                .iter()
                .find(|(e, _, _)| e.eq_ignore_ascii_case(ext))
        })
        .map(|&(_, mime, binary)| (mime, binary))
        .unwrap_or((DEFAULT_MIME_TYPE, true))
}
