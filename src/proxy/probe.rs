//! Protocol probes: one liveness attempt through a proxy
//!
//! The network side is behind [`ProxyTransport`] so the checker can be driven
//! by stubs in tests. HTTP requests are awaited in place; the SOCKS5 request
//! blocks its thread and is handed to the dispatcher's worker pool.

use crate::proxy::models::{ProbeFailure, ProbeOutcome, ProxyDescriptor};
use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy, Url};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Status code counted as a working proxy
const STATUS_OK: u16 = 200;

/// Status code returned by proxies that want credentials
const STATUS_PROXY_AUTH_REQUIRED: u16 = 407;

/// Failure reported by a transport before any status was received
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid proxy address: {0}")]
    InvalidProxy(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

impl From<TransportError> for ProbeFailure {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => ProbeFailure::Timeout,
            other => ProbeFailure::Transport(other.to_string()),
        }
    }
}

/// Capability to issue a GET through a proxy and report the status code
#[async_trait]
pub trait ProxyTransport: Send + Sync + 'static {
    /// GET `url` using `descriptor` as an HTTP proxy
    async fn http_get(
        &self,
        descriptor: &ProxyDescriptor,
        url: &str,
        timeout: Duration,
    ) -> Result<u16, TransportError>;

    /// GET `url` using `descriptor` as a SOCKS5 proxy. Blocks the calling
    /// thread for the whole request.
    fn socks5_get_blocking(
        &self,
        descriptor: &ProxyDescriptor,
        url: &str,
        timeout: Duration,
    ) -> Result<u16, TransportError>;
}

/// Transport backed by reqwest: async client for HTTP, blocking client for SOCKS5
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    fn http_proxy(descriptor: &ProxyDescriptor) -> Result<ReqwestProxy, TransportError> {
        // `all` so https targets are tunnelled with CONNECT as well
        let mut proxy = ReqwestProxy::all(format!("http://{}", descriptor.address()))
            .map_err(|e| TransportError::InvalidProxy(e.to_string()))?;
        if let Some(creds) = &descriptor.credentials {
            proxy = proxy.basic_auth(&creds.login, &creds.password);
        }
        Ok(proxy)
    }

    fn socks5_proxy(descriptor: &ProxyDescriptor) -> Result<ReqwestProxy, TransportError> {
        let invalid = || TransportError::InvalidProxy(descriptor.address());

        let mut url = Url::parse(&format!("socks5://{}", descriptor.address()))
            .map_err(|e| TransportError::InvalidProxy(e.to_string()))?;
        if let Some(creds) = &descriptor.credentials {
            url.set_username(&creds.login).map_err(|_| invalid())?;
            url.set_password(Some(&creds.password)).map_err(|_| invalid())?;
        }

        ReqwestProxy::all(url).map_err(|e| TransportError::InvalidProxy(e.to_string()))
    }
}

#[async_trait]
impl ProxyTransport for ReqwestTransport {
    async fn http_get(
        &self,
        descriptor: &ProxyDescriptor,
        url: &str,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let client = Client::builder()
            .proxy(Self::http_proxy(descriptor)?)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        let response = client.get(url).send().await?;
        Ok(response.status().as_u16())
    }

    fn socks5_get_blocking(
        &self,
        descriptor: &ProxyDescriptor,
        url: &str,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .proxy(Self::socks5_proxy(descriptor)?)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        let response = client.get(url).send()?;
        Ok(response.status().as_u16())
    }
}

/// Map a received status code to an outcome
fn classify_status(status: u16, elapsed: Duration) -> ProbeOutcome {
    match status {
        STATUS_OK => ProbeOutcome::working(elapsed),
        STATUS_PROXY_AUTH_REQUIRED => ProbeOutcome::failed(ProbeFailure::AuthenticationRequired),
        other => ProbeOutcome::failed(ProbeFailure::Status(other)),
    }
}

/// Probe `descriptor` as an HTTP proxy without blocking the caller
pub async fn probe_http<T: ProxyTransport + ?Sized>(
    transport: &T,
    descriptor: &ProxyDescriptor,
    url: &str,
    timeout: Duration,
) -> ProbeOutcome {
    let start = Instant::now();

    match tokio::time::timeout(timeout, transport.http_get(descriptor, url, timeout)).await {
        Ok(Ok(status)) => classify_status(status, start.elapsed()),
        Ok(Err(e)) => ProbeOutcome::failed(e.into()),
        Err(_) => ProbeOutcome::failed(ProbeFailure::Timeout),
    }
}

/// Probe `descriptor` as a SOCKS5 proxy. Blocks; run it on a worker.
pub fn probe_socks5_blocking<T: ProxyTransport + ?Sized>(
    transport: &T,
    descriptor: &ProxyDescriptor,
    url: &str,
    timeout: Duration,
) -> ProbeOutcome {
    let start = Instant::now();

    match transport.socks5_get_blocking(descriptor, url, timeout) {
        Ok(status) => classify_status(status, start.elapsed()),
        Err(e) => ProbeOutcome::failed(e.into()),
    }
}
