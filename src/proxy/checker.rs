//! Proxy checker: protocol fallback and batch fan-out

use crate::proxy::aggregator::{OutputSinks, ResultAggregator, RunSummary};
use crate::proxy::dispatcher::Dispatcher;
use crate::proxy::models::{
    ProbeFailure, ProbeOutcome, Protocol, ProxyDescriptor, ProxyEntry, Verdict,
};
use crate::proxy::parser::ProxyParser;
use crate::proxy::probe::{self, ProxyTransport, ReqwestTransport};
use crate::Result;
use anyhow::{ensure, Context};
use futures::future::join_all;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default timeout for SOCKS5 probes in seconds
const DEFAULT_SOCKS5_TIMEOUT_SECS: u64 = 10;

/// Default timeout for HTTP probes in seconds
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

/// Default number of concurrent probes
const DEFAULT_CONCURRENCY: usize = 20;

/// Default URL to test proxies against
const DEFAULT_TEST_URL: &str = "https://duckduckgo.com/";

/// Default directory for the result files
const DEFAULT_OUTPUT_DIR: &str = "proxy_results";

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// URL fetched through each proxy
    pub test_url: String,
    /// Maximum probes in flight, HTTP and SOCKS5 combined
    pub concurrency: usize,
    pub http_timeout: Duration,
    pub socks5_timeout: Duration,
    /// Directory receiving the result files
    pub output_dir: PathBuf,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            test_url: DEFAULT_TEST_URL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            socks5_timeout: Duration::from_secs(DEFAULT_SOCKS5_TIMEOUT_SECS),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_socks5_timeout(mut self, timeout: Duration) -> Self {
        self.socks5_timeout = timeout;
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.concurrency > 0, "concurrency must be at least 1");
        ensure!(!self.http_timeout.is_zero(), "HTTP timeout must be positive");
        ensure!(!self.socks5_timeout.is_zero(), "SOCKS5 timeout must be positive");
        Url::parse(&self.test_url)
            .with_context(|| format!("invalid test URL {}", self.test_url))?;
        Ok(())
    }
}

/// Proxy checker for validating proxies.
///
/// Descriptors with an explicit scheme are probed with that protocol only.
/// Descriptors without one are probed as HTTP first and fall back to SOCKS5
/// only when HTTP fails.
pub struct ProxyChecker {
    config: CheckerConfig,
    transport: Arc<dyn ProxyTransport>,
    dispatcher: Dispatcher,
}

impl ProxyChecker {
    /// Create a checker using the reqwest transport
    pub fn new(config: CheckerConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    /// Create a checker over a custom transport
    pub fn with_transport(
        config: CheckerConfig,
        transport: Arc<dyn ProxyTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(config.concurrency);

        Ok(Self {
            config,
            transport,
            dispatcher,
        })
    }

    /// HTTP probe under a dispatcher permit
    pub async fn probe_http(&self, descriptor: &ProxyDescriptor) -> ProbeOutcome {
        let work = probe::probe_http(
            self.transport.as_ref(),
            descriptor,
            &self.config.test_url,
            self.config.http_timeout,
        );

        self.dispatcher
            .run_bounded(work)
            .await
            .unwrap_or_else(|e| ProbeOutcome::failed(e.into()))
    }

    /// SOCKS5 probe on the worker pool under a dispatcher permit
    pub async fn probe_socks5(&self, descriptor: &ProxyDescriptor) -> ProbeOutcome {
        let transport = Arc::clone(&self.transport);
        let descriptor = descriptor.clone();
        let url = self.config.test_url.clone();
        let timeout = self.config.socks5_timeout;

        self.dispatcher
            .run_blocking(move || {
                probe::probe_socks5_blocking(transport.as_ref(), &descriptor, &url, timeout)
            })
            .await
            .unwrap_or_else(|e| ProbeOutcome::failed(e.into()))
    }

    /// Run the fallback chain for one entry
    pub async fn check_entry(&self, entry: &ProxyEntry) -> Verdict {
        let order: &[Protocol] = match entry.descriptor.protocol {
            Some(Protocol::Http) => &[Protocol::Http],
            Some(Protocol::Socks5) => &[Protocol::Socks5],
            None => &[Protocol::Http, Protocol::Socks5],
        };

        for &protocol in order {
            let outcome = match protocol {
                Protocol::Http => self.probe_http(&entry.descriptor).await,
                Protocol::Socks5 => self.probe_socks5(&entry.descriptor).await,
            };
            report(&entry.raw, protocol, &outcome);

            if outcome.is_success() {
                return Verdict::Valid(protocol);
            }
        }

        Verdict::Invalid
    }

    /// Parse every line, launch one check per parsed entry and wait for all
    pub async fn check_lines(&self, lines: &[String], aggregator: &ResultAggregator) {
        let mut checks = Vec::with_capacity(lines.len());

        for line in lines {
            match ProxyParser::parse_entry(line) {
                Ok(entry) => checks.push(async move {
                    let verdict = self.check_entry(&entry).await;
                    aggregator.record(&entry.raw, verdict);
                }),
                Err(e) => {
                    warn!(proxy = %line.trim(), error = %e, "Skipping invalid proxy format");
                    aggregator.record_parse_failure();
                }
            }
        }

        join_all(checks).await;
    }

    /// Check `lines` and write the result files into the output directory
    pub async fn run(&self, lines: &[String]) -> Result<RunSummary> {
        let sinks = OutputSinks::create(&self.config.output_dir)?;
        let aggregator = ResultAggregator::new(sinks);

        info!(
            proxies = lines.len(),
            concurrency = self.config.concurrency,
            test_url = %self.config.test_url,
            "Checking proxies"
        );
        self.check_lines(lines, &aggregator).await;

        Ok(aggregator.finish())
    }

    /// Read the proxy list at `path` and check it.
    ///
    /// The list is read before the result files are touched, so an unreadable
    /// input aborts without truncating earlier results.
    pub async fn run_file<P: AsRef<Path>>(&self, path: P) -> Result<RunSummary> {
        let lines = ProxyParser::read_lines(path)?;
        self.run(&lines).await
    }
}

fn report(raw: &str, protocol: Protocol, outcome: &ProbeOutcome) {
    match outcome {
        ProbeOutcome::Working { elapsed } => info!(
            proxy = raw,
            %protocol,
            "Working proxy - response time: {:.2} seconds",
            elapsed.as_secs_f64()
        ),
        ProbeOutcome::Failed(ProbeFailure::AuthenticationRequired) => {
            warn!(proxy = raw, %protocol, "Proxy authentication failed")
        }
        ProbeOutcome::Failed(failure) => {
            info!(proxy = raw, %protocol, "Failed proxy: {}", failure)
        }
    }
}
