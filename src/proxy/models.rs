//! Proxy data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Protocol a proxy is probed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Socks5,
}

impl Protocol {
    /// URL scheme prefix recognised by the parser
    pub fn scheme_prefix(self) -> &'static str {
        match self {
            Protocol::Http => "http://",
            Protocol::Socks5 => "socks5://",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Socks5 => write!(f, "socks5"),
        }
    }
}

/// Proxy authentication credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCredentials {
    pub login: String,
    pub password: String,
}

impl ProxyCredentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

/// Structured form of one proxy line.
///
/// `protocol == None` means the line carried no scheme and the checker has to
/// infer it by trying HTTP first, then SOCKS5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub protocol: Option<Protocol>,
    pub host: String,
    pub port: u16,
    pub credentials: Option<ProxyCredentials>,
}

impl ProxyDescriptor {
    /// Create a descriptor without credentials
    pub fn new(protocol: Option<Protocol>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            credentials: None,
        }
    }

    /// Attach login/password credentials
    pub fn with_credentials(
        mut self,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(ProxyCredentials::new(login, password));
        self
    }

    /// Get the proxy string in HOST:PORT format
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Canonical `[scheme://][login:password@]host:port` rendering.
    ///
    /// Feeding this back to the parser yields the same fields as long as the
    /// host has the dotted `a.b.c.d` shape.
    pub fn to_canonical_string(&self) -> String {
        let scheme = self.protocol.map_or("", Protocol::scheme_prefix);
        match &self.credentials {
            Some(creds) => format!(
                "{}{}:{}@{}",
                scheme,
                creds.login,
                creds.password,
                self.address()
            ),
            None => format!("{}{}", scheme, self.address()),
        }
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

/// A parsed descriptor together with the exact line it came from.
///
/// Output files receive `raw`, never a re-rendered descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEntry {
    pub raw: String,
    pub descriptor: ProxyDescriptor,
}

/// Why a single probe did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeFailure {
    /// Proxy answered 407
    AuthenticationRequired,
    /// Any status other than 200 and 407
    Status(u16),
    Timeout,
    Transport(String),
    /// The worker running the probe panicked or could not be scheduled
    WorkerFault(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::AuthenticationRequired => write!(f, "proxy authentication required"),
            ProbeFailure::Status(code) => write!(f, "status code {}", code),
            ProbeFailure::Timeout => write!(f, "timed out"),
            ProbeFailure::Transport(e) => write!(f, "{}", e),
            ProbeFailure::WorkerFault(e) => write!(f, "worker fault: {}", e),
        }
    }
}

/// Result of one protocol attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Working { elapsed: Duration },
    Failed(ProbeFailure),
}

impl ProbeOutcome {
    pub fn working(elapsed: Duration) -> Self {
        ProbeOutcome::Working { elapsed }
    }

    pub fn failed(failure: ProbeFailure) -> Self {
        ProbeOutcome::Failed(failure)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Working { .. })
    }

    /// Elapsed seconds, only reported for successful probes
    pub fn elapsed_secs(&self) -> Option<f64> {
        match self {
            ProbeOutcome::Working { elapsed } => Some(elapsed.as_secs_f64()),
            ProbeOutcome::Failed(_) => None,
        }
    }
}

/// Final classification of one descriptor after fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid(Protocol),
    Invalid,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid(_))
    }
}
