//! CLI argument definitions for Tickguard.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `get` | Call a backend path through the retrying executor |
//! | `classify` | Show how a status code and body would be classified |
//! | `login` | Store a credential pair |
//! | `logout` | Clear stored credentials |
//! | `session` | Inspect or renew the stored session |
//! | `sync` | Post a background message (`SYNC_SIGNALS`, `GET_VERSION`, ...) |
//! | `notify` | Dry-run a notification against an in-memory surface |
//!
//! # Global Options
//!
//! Flags override the `TICKGUARD_*` environment variables.
//!
//! | Option | Description |
//! |--------|-------------|
//! | `--base-url` | Backend origin |
//! | `--timeout-ms` | Per-attempt timeout |
//! | `--max-attempts` | Attempts per call |
//! | `--credentials` | Credential file |
//! | `--pretty` | Pretty-print JSON output |
//! | `-v` | More logging (repeatable) |
//!
//! # Examples
//!
//! ```bash
//! tickguard get /signals --query symbol=AAPL --pretty
//! tickguard classify 422 --body '{"detail":[{"loc":["body","qty"],"msg":"must be positive"}]}'
//! tickguard --credentials ~/.tickguard.json session --renew
//! tickguard sync SYNC_SIGNALS --signals-path /signals/latest
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tickguard_core::Permission;

/// Tickguard - resilient client for the trading-signals backend
#[derive(Debug, Parser)]
#[command(name = "tickguard", author, version, about = "Resilient trading-signals backend client")]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Backend origin, e.g. https://api.example.com.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Per-attempt timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Attempts per call, the first one included.
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// File holding the persisted credential pair.
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// GET a backend path.
    Get(GetArgs),
    /// Classify a status code and response body.
    Classify(ClassifyArgs),
    /// Store a credential pair.
    Login(LoginArgs),
    /// Clear stored credentials.
    Logout,
    /// Show the stored session.
    Session(SessionArgs),
    /// Post a background message.
    Sync(SyncArgs),
    /// Send a notification through an in-memory surface.
    Notify(NotifyArgs),
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Path relative to the base url.
    pub path: String,

    /// Query parameter as name=value (repeatable).
    #[arg(long = "query", value_parser = parse_pair)]
    pub query: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// HTTP status; 0 stands for "no response".
    pub status: u16,

    /// Response body.
    #[arg(long, default_value = "")]
    pub body: String,

    /// Retry-After header value.
    #[arg(long)]
    pub retry_after: Option<String>,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Exchange the refresh token for a new pair.
    #[arg(long, default_value_t = false)]
    pub renew: bool,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Wire name of the message.
    pub message: String,

    /// Path refreshed by SYNC_SIGNALS (repeatable).
    #[arg(long = "signals-path")]
    pub signal_paths: Vec<String>,

    /// Path refreshed by SYNC_MARKET_DATA (repeatable).
    #[arg(long = "market-path")]
    pub market_paths: Vec<String>,
}

#[derive(Debug, Args)]
pub struct NotifyArgs {
    pub title: String,

    #[arg(default_value = "")]
    pub body: String,

    /// Dedup tag.
    #[arg(long)]
    pub tag: Option<String>,

    /// Permission the surface starts with.
    #[arg(long, value_enum, default_value_t = PermissionArg::Granted)]
    pub permission: PermissionArg,

    /// What the permission prompt resolves to.
    #[arg(long, value_enum, default_value_t = PermissionArg::Granted)]
    pub answer: PermissionArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PermissionArg {
    Unsupported,
    Default,
    Denied,
    Granted,
}

impl From<PermissionArg> for Permission {
    fn from(value: PermissionArg) -> Self {
        match value {
            PermissionArg::Unsupported => Self::Unsupported,
            PermissionArg::Default => Self::Default,
            PermissionArg::Denied => Self::Denied,
            PermissionArg::Granted => Self::Granted,
        }
    }
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_owned(), value.to_owned())),
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}
