use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use proxy_validator::proxy::{CheckerConfig, ProxyChecker, ProxyDescriptor, ProxyParser};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// A concurrency-bounded proxy checker with HTTP to SOCKS5 fallback
#[derive(Parser)]
#[command(name = "proxy-validator")]
#[command(about = "A concurrency-bounded proxy checker with HTTP to SOCKS5 fallback")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Options for `check`, used when no subcommand is given
    #[command(flatten)]
    check: CheckArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxies and write working ones to the output directory
    Check(CheckArgs),
    /// Parse proxies from a file without probing them
    Parse {
        /// Input file containing proxies
        input: PathBuf,
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Input file containing proxies, one per line
    #[arg(short, long, default_value = "proxy.txt")]
    input: PathBuf,
    /// Directory for valid_http.txt, valid_socks5.txt and valid_total.txt
    #[arg(short, long, default_value = "proxy_results")]
    output_dir: PathBuf,
    /// Maximum number of concurrent checks
    #[arg(short = 'n', long, default_value = "20")]
    concurrency: usize,
    /// SOCKS5 timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,
    /// HTTP timeout in seconds
    #[arg(long, default_value = "20")]
    http_timeout: u64,
    /// URL to test proxies against
    #[arg(long, default_value = "https://duckduckgo.com/")]
    test_url: String,
}

/// One line of `parse --json` output
#[derive(Serialize)]
struct ParsedLine<'a> {
    line: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    descriptor: Option<&'a ProxyDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("proxy_validator=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Check(cli.check)) {
        Commands::Check(args) => check(args),
        Commands::Parse { input, json } => parse(input, json),
    }
}

fn check(args: CheckArgs) -> Result<()> {
    let started = Instant::now();

    let config = CheckerConfig::new()
        .with_concurrency(args.concurrency)
        .with_socks5_timeout(Duration::from_secs(args.timeout))
        .with_http_timeout(Duration::from_secs(args.http_timeout))
        .with_test_url(args.test_url)
        .with_output_dir(args.output_dir);
    config.validate()?;

    // Cooperative scheduler for the fan-out; blocking SOCKS5 probes get a
    // thread pool no larger than the concurrency ceiling.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .max_blocking_threads(config.concurrency)
        .enable_all()
        .build()?;

    let summary = runtime.block_on(async {
        let checker = ProxyChecker::new(config)?;
        info!(input = %args.input.display(), "Loading proxies");
        checker.run_file(&args.input).await
    })?;

    println!();
    println!("{}", summary);
    println!(
        "___________________\nFinished in {:.2} seconds.",
        started.elapsed().as_secs_f64()
    );

    Ok(())
}

fn parse(input: PathBuf, json: bool) -> Result<()> {
    let lines = ProxyParser::read_lines(&input)?;
    let results: Vec<_> = lines
        .iter()
        .map(|line| (line.as_str(), ProxyParser::parse_line(line)))
        .collect();

    let parsed = results.iter().filter(|(_, r)| r.is_ok()).count();
    info!(
        parsed,
        rejected = results.len() - parsed,
        "Parsed proxies from {:?}",
        input
    );

    if json {
        let out: Vec<ParsedLine<'_>> = results
            .iter()
            .map(|(line, result)| ParsedLine {
                line,
                descriptor: result.as_ref().ok(),
                error: result.as_ref().err().map(ToString::to_string),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for (line, result) in &results {
            match result {
                Ok(descriptor) => {
                    let protocol = descriptor
                        .protocol
                        .map_or_else(|| "auto".to_string(), |p| p.to_string());
                    let auth = if descriptor.credentials.is_some() { "yes" } else { "no" };
                    println!(
                        "{} -> {} {} auth={}",
                        line,
                        protocol,
                        descriptor.address(),
                        auth
                    );
                }
                Err(e) => eprintln!("Skipping invalid proxy format: {} - Error: {}", line, e),
            }
        }
    }

    Ok(())
}
