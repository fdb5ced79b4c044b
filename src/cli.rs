//! Command-line interface
//!
//! One operation per invocation, the way the CI layer drives it:
//! `shepherd <operation> [flags]`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ShepherdError};
use crate::manager::Operation;
use crate::source::SourceFilter;

pub const USAGE: &str = "\
shepherd - proxy pool maintenance for CI-driven scrapers

USAGE:
    shepherd <operation> [flags]

OPERATIONS:
    update      Source and validate candidates until the pool holds
                --min-count valid proxies
    rebuild     Discard the pool and refill from scratch (all sources)
    validate    Revalidate every record in the pool (informational)
    clean       Remove banned and stale failed records
    recover     Revalidate failed records; report fallback when still
                below --threshold

FLAGS:
    --min-count <N>      Valid records required by update/rebuild (default: 5)
    --timeout <SECS>     Overall operation deadline (default: 60)
    --source <KIND>      Source filter for update: all|api|file (default: all)
    --threshold <N>      Valid records required by recover (default: 5)
    --config <PATH>      Config file (default: $SHEPHERD_CONFIG or shepherd.json)
    --snapshot <PATH>    Override the configured snapshot path
    -h, --help           Show this help

EXIT CODES:
    0   operation met its success condition
    1   operation completed below threshold (apply fallback policy)
    2   fatal error (configuration, snapshot I/O)
";

const DEFAULT_MIN_COUNT: usize = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_THRESHOLD: usize = 5;
const DEFAULT_CONFIG_PATH: &str = "shepherd.json";

/// Parsed invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub operation: Operation,
    pub min_count: usize,
    pub timeout: Duration,
    pub source: SourceFilter,
    pub threshold: usize,
    pub config_path: PathBuf,
    pub snapshot_path: Option<PathBuf>,
}

/// Parse process arguments. `Ok(None)` means help was requested.
pub fn parse() -> Result<Option<CliOptions>> {
    parse_from(env::args().skip(1))
}

pub fn parse_from<I>(mut args: I) -> Result<Option<CliOptions>>
where
    I: Iterator<Item = String>,
{
    let mut operation = None;
    let mut min_count = DEFAULT_MIN_COUNT;
    let mut timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
    let mut source = SourceFilter::All;
    let mut threshold = DEFAULT_THRESHOLD;
    let mut config_path = env::var("SHEPHERD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut snapshot_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--min-count" => {
                min_count = parse_number(&mut args, "--min-count")?;
            }
            "--timeout" => {
                let secs: u64 = parse_number(&mut args, "--timeout")?;
                timeout = Duration::from_secs(secs);
            }
            "--source" => {
                let v = flag_value(&mut args, "--source")?;
                source = SourceFilter::from_str(&v).ok_or_else(|| {
                    ShepherdError::InvalidArgs(format!("unknown source filter: {}", v))
                })?;
            }
            "--threshold" => {
                threshold = parse_number(&mut args, "--threshold")?;
            }
            "--config" => {
                config_path = PathBuf::from(flag_value(&mut args, "--config")?);
            }
            "--snapshot" => {
                snapshot_path = Some(PathBuf::from(flag_value(&mut args, "--snapshot")?));
            }
            "-h" | "--help" => return Ok(None),
            flag if flag.starts_with('-') => {
                return Err(ShepherdError::InvalidArgs(format!("unknown flag: {}", flag)));
            }
            op => {
                if operation.is_some() {
                    return Err(ShepherdError::InvalidArgs(format!(
                        "unexpected argument: {}",
                        op
                    )));
                }
                operation = Some(Operation::from_str(op).ok_or_else(|| {
                    ShepherdError::InvalidArgs(format!("unknown operation: {}", op))
                })?);
            }
        }
    }

    let operation = operation.ok_or_else(|| {
        ShepherdError::InvalidArgs("missing operation (update|validate|clean|rebuild|recover)".into())
    })?;

    Ok(Some(CliOptions {
        operation,
        min_count,
        timeout,
        source,
        threshold,
        config_path,
        snapshot_path,
    }))
}

fn flag_value<I>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| ShepherdError::InvalidArgs(format!("missing value for {}", flag)))
}

fn parse_number<I, N>(args: &mut I, flag: &str) -> Result<N>
where
    I: Iterator<Item = String>,
    N: std::str::FromStr,
{
    let v = flag_value(args, flag)?;
    v.parse().map_err(|_| {
        ShepherdError::InvalidArgs(format!("{} must be a number, got: {}", flag, v))
    })
}
