//! Transport layer for CLI and HTTP

pub mod cli;
pub mod http;

pub use http::{router, run_http_server, AppState};
