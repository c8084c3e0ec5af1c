//! Proxy module for parsing and checking proxies
//!
//! This module provides functionality for:
//! - Parsing proxy lines (IP:PORT, IP:PORT:USER:PASS, USER:PASS@IP:PORT, ...)
//! - Probing proxies as HTTP or SOCKS5 under a global concurrency ceiling
//! - Falling back from HTTP to SOCKS5 when the scheme is not given
//! - Tallying results and writing working proxies to per-protocol files

pub mod aggregator;
pub mod checker;
pub mod dispatcher;
#[cfg(test)]
mod loopback;
pub mod models;
pub mod parser;
pub mod probe;

pub use aggregator::{OutputSinks, ResultAggregator, RunSummary, RunTally};
pub use checker::{CheckerConfig, ProxyChecker};
pub use dispatcher::{DispatchError, Dispatcher, WorkerPool};
pub use models::{
    ProbeFailure, ProbeOutcome, Protocol, ProxyCredentials, ProxyDescriptor, ProxyEntry, Verdict,
};
pub use parser::{ParseError, ProxyParser};
pub use probe::{ProxyTransport, ReqwestTransport, TransportError};
