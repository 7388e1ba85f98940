//! Command line and environment configuration.
//!
//! Every option can also be set through an `XEL_*` environment variable.
//! [`Args`] is the raw parse; [`Config`] is the validated form the daemon
//! runs with.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::work::Preference;

pub const DEFAULT_URL: &str = "http://127.0.0.1:6876/nxt";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid protocol in URL '{0}' (http or https required)")]
    UnsupportedScheme(String),

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("secret phrase must not be empty")]
    EmptyPhrase,

    #[error("--user and --pass must be given together")]
    PartialCredentials,
}

/// Mining client for Elastic (XEL) work packages.
#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Coordinator URL
    #[arg(short = 'o', long, env = "XEL_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Username for coordinator HTTP authentication
    #[arg(short, long, env = "XEL_USER")]
    pub user: Option<String>,

    /// Password for coordinator HTTP authentication
    #[arg(short, long, env = "XEL_PASS", hide_env_values = true)]
    pub pass: Option<String>,

    /// Account secret phrase
    #[arg(short = 'P', long, env = "XEL_PHRASE", hide_env_values = true)]
    pub phrase: String,

    /// Mining preference: profit, wcet, or workid:<id>
    #[arg(short, long, env = "XEL_MINING", default_value = "profit")]
    pub mining: Preference,

    /// Number of worker threads (default: number of CPUs)
    #[arg(short, long, env = "XEL_THREADS",
          value_parser = clap::value_parser!(u16).range(1..=9999))]
    pub threads: Option<u16>,

    /// Seconds between work refreshes
    #[arg(short, long, env = "XEL_SCAN_TIME", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..=9999))]
    pub scan_time: u64,

    /// Request timeout in seconds
    #[arg(short = 'T', long, env = "XEL_TIMEOUT", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..=9999))]
    pub timeout: u64,

    /// Consecutive failed work fetches tolerated (-1 retries forever)
    #[arg(short, long, env = "XEL_RETRIES", default_value_t = -1,
          allow_negative_numbers = true,
          value_parser = clap::value_parser!(i32).range(-1..=9999))]
    pub retries: i32,

    /// Seconds to pause after a failed request
    #[arg(short = 'R', long, env = "XEL_RETRY_PAUSE", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..=9999))]
    pub retry_pause: u64,

    /// Mine the work list in a local JSON file instead of a coordinator
    #[arg(long, value_name = "FILE")]
    pub test_miner: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Log per-worker rate reports at debug level only
    #[arg(short, long)]
    pub quiet: bool,

    /// Log every coordinator request and response
    #[arg(long)]
    pub protocol: bool,

    /// Disable the interactive console monitor
    #[arg(long)]
    pub no_console: bool,
}

/// Signing identity derived from the secret phrase.
#[derive(Clone)]
pub struct Account {
    secret_phrase: String,
    public_key: [u8; 32],
}

impl Account {
    pub fn from_phrase(phrase: &str) -> Result<Self, ConfigError> {
        if phrase.is_empty() {
            return Err(ConfigError::EmptyPhrase);
        }
        let seed: [u8; 32] = Sha256::digest(phrase.as_bytes()).into();
        let secret = StaticSecret::from(seed);
        let public_key = PublicKey::from(&secret).to_bytes();

        Ok(Self {
            secret_phrase: phrase.to_string(),
            public_key,
        })
    }

    pub fn secret_phrase(&self) -> &str {
        &self.secret_phrase
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public_key
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode_upper(self.public_key)
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Validated runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub url: String,
    pub credentials: Option<(String, String)>,
    pub account: Account,
    pub preference: Preference,
    pub threads: usize,
    pub scan_time: Duration,
    pub timeout: Duration,
    pub retries: i32,
    pub retry_pause: Duration,
    pub test_miner: Option<PathBuf>,
    pub quiet: bool,
    pub console: bool,
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let credentials = match (args.user, args.pass) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            _ => return Err(ConfigError::PartialCredentials),
        };

        let threads = match args.threads {
            Some(n) => usize::from(n),
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };

        Ok(Self {
            url: normalize_url(&args.url)?,
            credentials,
            account: Account::from_phrase(&args.phrase)?,
            preference: args.mining,
            threads,
            scan_time: Duration::from_secs(args.scan_time),
            timeout: Duration::from_secs(args.timeout),
            retries: args.retries,
            retry_pause: Duration::from_secs(args.retry_pause),
            test_miner: args.test_miner,
            quiet: args.quiet,
            console: !args.no_console,
        })
    }
}

/// Add a missing `http://` scheme and `/nxt` path.
pub fn normalize_url(raw: &str) -> Result<String, ConfigError> {
    let raw = raw.trim();

    let mut url = match raw.split_once("://") {
        Some((scheme, _)) => {
            if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
                return Err(ConfigError::UnsupportedScheme(raw.to_string()));
            }
            raw.to_string()
        }
        None => {
            if raw.is_empty() || raw.starts_with('/') {
                return Err(ConfigError::InvalidUrl(raw.to_string()));
            }
            format!("http://{}", raw)
        }
    };

    if !url.contains("/nxt") {
        url.push_str("/nxt");
    }
    Ok(url)
}
