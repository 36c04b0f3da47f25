//! Configuration - environment defaults overridden by command-line flags

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_VERBOSE: &str = "TUSK_VERBOSE";
pub const ENV_LIST: &str = "TUSK_LIST";
pub const ENV_HELP: &str = "TUSK_HELP";
pub const ENV_TIMEOUT: &str = "TUSK_TIMEOUT";
pub const ENV_TRACE: &str = "TUSK_TRACE";
pub const ENV_IGNORE_DEFAULT: &str = "TUSK_IGNOREDEFAULT";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid bool value {0:?}")]
    InvalidBool(String),

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),
}

/// Command-line flags of a build program
#[derive(Parser, Debug, Default, Clone, PartialEq)]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Show verbose output when running targets
    #[arg(short = 'v')]
    pub verbose: bool,

    /// List targets
    #[arg(short = 'l')]
    pub list: bool,

    /// Show this help, or the description of a target
    #[arg(short = 'h')]
    pub help: bool,

    /// Timeout in duration parsable format (e.g. 5m30s)
    #[arg(short = 't', value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Trace task execution and save to the given file in Chrome
    /// trace_event format
    #[arg(long, value_name = "FILE")]
    pub trace: Option<PathBuf>,

    /// Targets to run, in order
    pub targets: Vec<String>,
}

/// Resolved run settings
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Settings {
    pub verbose: bool,
    pub list: bool,
    pub help: bool,
    pub timeout: Option<Duration>,
    pub trace: Option<PathBuf>,
    pub ignore_default: bool,
}

impl Settings {
    /// Settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Settings from an environment lookup. Malformed values are logged and
    /// treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| match lookup(name).filter(|v| !v.is_empty()) {
            None => false,
            Some(value) => parse_bool(&value).unwrap_or_else(|e| {
                log::warn!("Environment variable {} ignored: {}", name, e);
                false
            }),
        };

        let timeout = lookup(ENV_TIMEOUT)
            .filter(|v| !v.is_empty())
            .and_then(|value| match parse_duration(&value) {
                Ok(d) if d.is_zero() => None,
                Ok(d) => Some(d),
                Err(e) => {
                    log::warn!("Environment variable {} ignored: {}", ENV_TIMEOUT, e);
                    None
                }
            });

        Self {
            verbose: flag(ENV_VERBOSE),
            list: flag(ENV_LIST),
            help: flag(ENV_HELP),
            timeout,
            trace: lookup(ENV_TRACE).filter(|v| !v.is_empty()).map(PathBuf::from),
            ignore_default: flag(ENV_IGNORE_DEFAULT),
        }
    }

    /// Apply command-line flags on top of these settings
    pub fn merge(mut self, cli: &Cli) -> Self {
        self.verbose |= cli.verbose;
        self.list |= cli.list;
        self.help |= cli.help;
        if let Some(timeout) = cli.timeout {
            self.timeout = (!timeout.is_zero()).then_some(timeout);
        }
        if let Some(trace) = &cli.trace {
            self.trace = Some(trace.clone());
        }
        self
    }
}

/// Parse a boolean the way Go's `strconv.ParseBool` does
pub fn parse_bool(value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ConfigError::InvalidBool(value.to_string())),
    }
}

/// Parse a duration such as `300ms`, `1.5h` or `2h45m`.
///
/// Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. Negative
/// durations are rejected.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(value.to_string());

    let mut rest = value.strip_prefix('+').unwrap_or(value);
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut nanos = 0f64;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);
        if number.is_empty() || number == "." {
            return Err(invalid());
        }
        let number: f64 = number.parse().map_err(|_| invalid())?;

        let split = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(split);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };

        nanos += number * scale;
        rest = tail;
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}
