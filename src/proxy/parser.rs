//! Proxy parser module for turning raw proxy lines into descriptors

use crate::proxy::models::{Protocol, ProxyDescriptor, ProxyEntry};
use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Reasons a proxy line is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// `@` present but not exactly one side looks like `ip:port`, or a
    /// four-token line matches neither field order
    #[error("ambiguous proxy format")]
    AmbiguousFormat,
    #[error("unsupported proxy format")]
    UnsupportedFormat,
    #[error("invalid port value: {0}")]
    InvalidPort(String),
    #[error("missing host")]
    MissingHost,
    #[error("login and password must both be present")]
    IncompleteCredentials,
}

/// Borrowed fields located in a line before validation
struct RawFields<'a> {
    host: &'a str,
    port: &'a str,
    credentials: Option<&'a str>,
}

/// Proxy parser for parsing proxies from strings and files
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line
    ///
    /// Supports formats, each optionally prefixed with `http://` or `socks5://`:
    /// - IP:PORT
    /// - IP:PORT:USER:PASS
    /// - USER:PASS:IP:PORT
    /// - USER:PASS@IP:PORT
    /// - IP:PORT@USER:PASS
    pub fn parse_line(line: &str) -> std::result::Result<ProxyDescriptor, ParseError> {
        let (protocol, rest) = Self::strip_scheme(line);

        let fields = match rest.split_once('@') {
            Some((first, second)) => Self::split_at_format(first, second)?,
            None => Self::split_colon_format(rest)?,
        };

        if !is_all_digits(fields.port) {
            return Err(ParseError::InvalidPort(fields.port.to_string()));
        }
        let port: u16 = fields
            .port
            .parse()
            .map_err(|_| ParseError::InvalidPort(fields.port.to_string()))?;

        if fields.host.is_empty() {
            return Err(ParseError::MissingHost);
        }

        let descriptor = ProxyDescriptor::new(protocol, fields.host, port);
        match fields.credentials {
            Some(creds) => {
                let (login, password) = creds
                    .split_once(':')
                    .ok_or(ParseError::IncompleteCredentials)?;
                if login.is_empty() || password.is_empty() {
                    return Err(ParseError::IncompleteCredentials);
                }
                Ok(descriptor.with_credentials(login, password))
            }
            None => Ok(descriptor),
        }
    }

    /// Trim a raw line and parse it, keeping the trimmed text alongside
    pub fn parse_entry(line: &str) -> std::result::Result<ProxyEntry, ParseError> {
        let raw = line.trim();
        let descriptor = Self::parse_line(raw)?;
        Ok(ProxyEntry {
            raw: raw.to_string(),
            descriptor,
        })
    }

    /// Parse every line of `content`, pairing each trimmed line with its result
    pub fn parse_string(
        content: &str,
    ) -> Vec<(String, std::result::Result<ProxyDescriptor, ParseError>)> {
        content
            .lines()
            .map(|line| {
                let raw = line.trim();
                (raw.to_string(), Self::parse_line(raw))
            })
            .collect()
    }

    /// Read the proxy list, one trimmed entry per line
    pub fn read_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read proxy list {}", path.display()))?;
        Ok(content.lines().map(|l| l.trim().to_string()).collect())
    }

    fn strip_scheme(line: &str) -> (Option<Protocol>, &str) {
        for protocol in [Protocol::Socks5, Protocol::Http] {
            if let Some(rest) = line.strip_prefix(protocol.scheme_prefix()) {
                return (Some(protocol), rest);
            }
        }
        (None, line)
    }

    /// `creds@ip:port` or `ip:port@creds`; exactly one side must be the endpoint
    fn split_at_format<'a>(
        first: &'a str,
        second: &'a str,
    ) -> std::result::Result<RawFields<'a>, ParseError> {
        let (endpoint, creds) = match (looks_like_ip_port(first), looks_like_ip_port(second)) {
            (true, false) => (first, second),
            (false, true) => (second, first),
            _ => return Err(ParseError::AmbiguousFormat),
        };
        // shape check guarantees exactly one ':'
        let (host, port) = endpoint
            .split_once(':')
            .ok_or(ParseError::AmbiguousFormat)?;

        Ok(RawFields {
            host,
            port,
            credentials: Some(creds),
        })
    }

    fn split_colon_format(line: &str) -> std::result::Result<RawFields<'_>, ParseError> {
        let parts: Vec<&str> = line.split(':').collect();

        match *parts.as_slice() {
            [host, port] => Ok(RawFields {
                host,
                port,
                credentials: None,
            }),
            [a, b, c, d] => {
                if dot_count(a) == 3 && is_all_digits(b) {
                    // IP:PORT:USER:PASS
                    Ok(RawFields {
                        host: a,
                        port: b,
                        credentials: Some(&line[a.len() + b.len() + 2..]),
                    })
                } else if dot_count(c) == 3 && is_all_digits(d) {
                    // USER:PASS:IP:PORT
                    Ok(RawFields {
                        host: c,
                        port: d,
                        credentials: Some(&line[..a.len() + b.len() + 1]),
                    })
                } else {
                    Err(ParseError::AmbiguousFormat)
                }
            }
            _ => Err(ParseError::UnsupportedFormat),
        }
    }
}

fn dot_count(s: &str) -> usize {
    s.matches('.').count()
}

fn looks_like_ip_port(s: &str) -> bool {
    dot_count(s) == 3 && s.matches(':').count() == 1
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
