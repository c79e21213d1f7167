//! HTTP protocol pieces used by the session engine.
//!
//! # Architecture
//!
//! - **`parser`**: request line and header parsing, argument helpers
//! - **`request`**: commands, versions and the parsed request head
//! - **`response`**: status codes, header builder and generated pages
//! - **`form`**: URL-encoded form fields
//! - **`writer`**: moves response bytes through transmit segments
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Request flow
//!
//! ```text
//!        ┌─────────────┐
//!        │   HEADER    │ ← Read request line and headers
//!        └──────┬──────┘
//!               │ POST with body
//!               ▼
//!        ┌─────────────┐
//!        │   POSTRX    │ ← Buffer the form body
//!        └──────┬──────┘
//!               ▼
//!        ┌─────────────┐
//!        │   CONTENT   │ ← Files, includes, exec output, error pages
//!        └──────┬──────┘
//!               │ Response queued
//!               ▼
//!        ┌─────────────┐
//!        │  SENDDATA   │ ← Drain segments to the socket
//!        └──────┬──────┘
//!               ├─ Keep-Alive → HEADER (same connection)
//!               └─ Close → ENDING
//! ```
//!
//! Push routes leave CONTENT for PUSHING and end the connection when the
//! stream is done.

pub mod form;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
