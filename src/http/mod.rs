//! HTTP protocol implementation.
//!
//! A small HTTP/1.1 server with keep-alive connections and a first-match
//! route table.
//!
//! # Architecture
//!
//! - **`connection`**: Per-connection request-response state machine
//! - **`parser`**: Parses incoming HTTP requests from byte buffers
//! - **`request`**: Transport-independent request model
//! - **`response`**: Response model with builder pattern
//! - **`router`**: Route table, path templates and dispatch
//! - **`writer`**: Serializes and writes HTTP responses to the client
//! - **`mime`**: Content type detection based on file extensions
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received (malformed → 400, then Closed)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Dispatch through the router
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```

pub mod request;
pub mod response;
pub mod parser;
pub mod connection;
pub mod router;
pub mod writer;
pub mod mime;
