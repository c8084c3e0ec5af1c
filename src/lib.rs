//! Proxy Validator - concurrency-bounded proxy liveness checker
//!
//! Parses proxy lines in several common formats, probes each proxy with a real
//! request (HTTP first, SOCKS5 as fallback when the scheme is unknown) and
//! sorts working proxies into result files.

pub mod proxy;

pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
