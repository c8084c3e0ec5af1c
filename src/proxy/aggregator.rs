//! Result aggregation: run tally, output files and the final summary

use crate::proxy::models::{Protocol, Verdict};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::error;

/// Lines that worked as HTTP proxies
pub const HTTP_VALID_FILE: &str = "valid_http.txt";

/// Lines that worked as SOCKS5 proxies
pub const SOCKS5_VALID_FILE: &str = "valid_socks5.txt";

/// Every working line, in completion order
pub const TOTAL_VALID_FILE: &str = "valid_total.txt";

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTally {
    pub http_valid: usize,
    pub socks5_valid: usize,
    pub invalid: usize,
    pub total_seen: usize,
}

impl RunTally {
    pub fn valid(&self) -> usize {
        self.http_valid + self.socks5_valid
    }

    /// Every seen line landed in exactly one bucket
    pub fn is_balanced(&self) -> bool {
        self.valid() + self.invalid == self.total_seen
    }
}

/// The three append-only result files, truncated when created
#[derive(Debug)]
pub struct OutputSinks {
    dir: PathBuf,
    http: File,
    socks5: File,
    total: File,
}

impl OutputSinks {
    /// Create `dir` if needed and truncate the result files inside it
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;

        let open = |name: &str| {
            let path = dir.join(name);
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))
        };

        Ok(Self {
            http: open(HTTP_VALID_FILE)?,
            socks5: open(SOCKS5_VALID_FILE)?,
            total: open(TOTAL_VALID_FILE)?,
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append `line` to the protocol file and the combined file
    fn append(&mut self, protocol: Protocol, line: &str) -> io::Result<()> {
        let entry = format!("{}\n", line);
        let file = match protocol {
            Protocol::Http => &mut self.http,
            Protocol::Socks5 => &mut self.socks5,
        };
        file.write_all(entry.as_bytes())?;
        self.total.write_all(entry.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.http.flush()?;
        self.socks5.flush()?;
        self.total.flush()
    }
}

struct RunState {
    tally: RunTally,
    sinks: OutputSinks,
}

/// Owner of the tally and sinks for a single run.
///
/// Counter update and file append for one outcome happen under one lock, so
/// concurrent completions never interleave partial writes or lose counts.
pub struct ResultAggregator {
    state: Mutex<RunState>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl ResultAggregator {
    pub fn new(sinks: OutputSinks) -> Self {
        Self {
            state: Mutex::new(RunState {
                tally: RunTally::default(),
                sinks,
            }),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the final verdict for one descriptor
    pub fn record(&self, raw: &str, verdict: Verdict) {
        let mut state = self.lock();
        state.tally.total_seen += 1;

        match verdict {
            Verdict::Valid(protocol) => {
                match protocol {
                    Protocol::Http => state.tally.http_valid += 1,
                    Protocol::Socks5 => state.tally.socks5_valid += 1,
                }
                if let Err(e) = state.sinks.append(protocol, raw) {
                    error!(proxy = raw, %protocol, error = %e, "failed to write result line");
                }
            }
            Verdict::Invalid => state.tally.invalid += 1,
        }
    }

    /// Record a line that never reached probing
    pub fn record_parse_failure(&self) {
        let mut state = self.lock();
        state.tally.total_seen += 1;
        state.tally.invalid += 1;
    }

    /// Snapshot of the counters so far
    pub fn tally(&self) -> RunTally {
        self.lock().tally
    }

    /// Flush the sinks and produce the run summary
    pub fn finish(self) -> RunSummary {
        let mut state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = state.sinks.flush() {
            error!(dir = %state.sinks.dir().display(), error = %e, "failed to flush result files");
        }

        RunSummary {
            started_at: self.started_at,
            duration: self.started.elapsed(),
            tally: state.tally,
        }
    }
}

/// Aggregate outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    #[serde(flatten)]
    pub tally: RunTally,
}

fn serialize_secs<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.tally;
        writeln!(f, "----- Summary -----")?;
        writeln!(f, "{:<14} {}", "Total checked:", t.total_seen)?;
        writeln!(f, "{:<14} {}/{}", "Valid/Invalid:", t.valid(), t.invalid)?;
        writeln!(f)?;
        writeln!(f, "{:<14} {}", "HTTP valid:", t.http_valid)?;
        write!(f, "{:<14} {}", "SOCKS5 valid:", t.socks5_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn read(dir: &Path, name: &str) -> Vec<String> {
        fs::read_to_string(dir.join(name))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_sinks_truncate_existing_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(HTTP_VALID_FILE), "stale\n").unwrap();

        let sinks = OutputSinks::create(tmp.path()).unwrap();
        drop(sinks);

        assert!(read(tmp.path(), HTTP_VALID_FILE).is_empty());
        assert!(tmp.path().join(SOCKS5_VALID_FILE).exists());
        assert!(tmp.path().join(TOTAL_VALID_FILE).exists());
    }

    #[test]
    fn test_sinks_create_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("results");
        let sinks = OutputSinks::create(&nested).unwrap();
        assert_eq!(sinks.dir(), nested.as_path());
        assert!(nested.join(TOTAL_VALID_FILE).exists());
    }

    #[test]
    fn test_record_routes_raw_lines() {
        let tmp = TempDir::new().unwrap();
        let aggregator = ResultAggregator::new(OutputSinks::create(tmp.path()).unwrap());

        aggregator.record("1.2.3.4:8080", Verdict::Valid(Protocol::Http));
        aggregator.record("socks5://u:p@5.6.7.8:1080", Verdict::Valid(Protocol::Socks5));
        aggregator.record("9.9.9.9:80", Verdict::Invalid);
        aggregator.record_parse_failure();

        let summary = aggregator.finish();
        assert_eq!(
            summary.tally,
            RunTally {
                http_valid: 1,
                socks5_valid: 1,
                invalid: 2,
                total_seen: 4,
            }
        );
        assert!(summary.tally.is_balanced());

        assert_eq!(read(tmp.path(), HTTP_VALID_FILE), vec!["1.2.3.4:8080"]);
        assert_eq!(
            read(tmp.path(), SOCKS5_VALID_FILE),
            vec!["socks5://u:p@5.6.7.8:1080"]
        );
        assert_eq!(
            read(tmp.path(), TOTAL_VALID_FILE),
            vec!["1.2.3.4:8080", "socks5://u:p@5.6.7.8:1080"]
        );
    }

    #[test]
    fn test_concurrent_records_stay_consistent() {
        let tmp = TempDir::new().unwrap();
        let aggregator = Arc::new(ResultAggregator::new(
            OutputSinks::create(tmp.path()).unwrap(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let line = format!("10.0.{}.{}:8080", t, i);
                        let verdict = match i % 3 {
                            0 => Verdict::Valid(Protocol::Http),
                            1 => Verdict::Valid(Protocol::Socks5),
                            _ => Verdict::Invalid,
                        };
                        aggregator.record(&line, verdict);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let tally = aggregator.tally();
        assert_eq!(tally.total_seen, 400);
        assert!(tally.is_balanced());

        let http = read(tmp.path(), HTTP_VALID_FILE);
        let socks5 = read(tmp.path(), SOCKS5_VALID_FILE);
        let total = read(tmp.path(), TOTAL_VALID_FILE);
        assert_eq!(http.len(), tally.http_valid);
        assert_eq!(socks5.len(), tally.socks5_valid);
        assert_eq!(total.len(), tally.valid());
        assert!(total.iter().all(|l| l.starts_with("10.0.") && l.ends_with(":8080")));
    }

    #[test]
    fn test_summary_layout() {
        let summary = RunSummary {
            started_at: Utc::now(),
            duration: Duration::from_secs(3),
            tally: RunTally {
                http_valid: 2,
                socks5_valid: 1,
                invalid: 7,
                total_seen: 10,
            },
        };
        let text = summary.to_string();
        assert!(text.contains("Total checked: 10"));
        assert!(text.contains("Valid/Invalid: 3/7"));
        assert!(text.contains("HTTP valid:    2"));
        assert!(text.contains("SOCKS5 valid:  1"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["http_valid"], 2);
        assert_eq!(json["duration_secs"], 3.0);
    }
}
