//! microweb - embeddable HTTP server engine
//!
//! A single-threaded session engine for small targets: fixed transmit
//! buffers, non-blocking sockets and one cooperative poll loop serving
//! static pages with server-side includes, forms and pushed streams.

pub mod config;
pub mod error;
pub mod fs;
pub mod http;
pub mod server;

pub use config::Config;
pub use error::WebError;
pub use server::Server;
