//! Transport layer.

pub mod http;

pub use http::{router, HttpTransport, ServerState};
