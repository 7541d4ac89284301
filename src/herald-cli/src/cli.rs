//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Log verbosity level for CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors
    Warn,
    /// Show informational messages, warnings, and errors (default)
    #[default]
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<LogLevel> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Level from `--log-level`, then `-v`, then `HERALD_LOG_LEVEL`.
    pub fn resolve(explicit: Option<LogLevel>, verbose: bool, env: Option<&str>) -> LogLevel {
        if let Some(level) = explicit {
            level
        } else if verbose {
            LogLevel::Debug
        } else {
            env.and_then(LogLevel::from_str_loose).unwrap_or_default()
        }
    }
}

/// Herald - watch Slack for messages addressed to an agent persona.
#[derive(Parser, Debug)]
#[command(name = "herald", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Monitor options when no subcommand is given.
    #[command(flatten)]
    pub monitor: MonitorArgs,

    /// Set log verbosity level
    #[arg(long = "log-level", short = 'L', value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Enable debug output
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the channel and dispatch mentions to the agent (default)
    Monitor(MonitorArgs),

    /// Post a message as an agent persona
    Say(SayArgs),

    /// List the registered agents
    Agents(AgentsArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct MonitorArgs {
    /// Agent to run as (default: from the settings file)
    #[arg(long, short = 'a')]
    pub agent: Option<String>,

    /// Poll interval in seconds
    #[arg(long, short = 'i', value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Channel id or name (default: from the settings file)
    #[arg(long, short = 'c')]
    pub channel: Option<String>,

    /// Stop after this many seconds; 0 runs until interrupted
    #[arg(long = "max-runtime")]
    pub max_runtime: Option<u64>,

    /// Directory for the seen-state and lock files
    #[arg(long = "state-dir", env = "HERALD_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Settings file (default: ~/.agent_settings.json)
    #[arg(long, env = "HERALD_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Slack token file
    #[arg(long = "token-file", env = "HERALD_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Agent command line; the instruction is appended as the last argument
    #[arg(long = "agent-command", env = "HERALD_AGENT_COMMAND")]
    pub agent_command: Option<String>,

    /// Run a single cycle, persist and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SayArgs {
    /// Agent persona to post as (default: from the settings file)
    #[arg(long, short = 'a')]
    pub agent: Option<String>,

    /// Channel id or name (default: from the settings file)
    #[arg(long, short = 'c')]
    pub channel: Option<String>,

    /// Reply inside this thread
    #[arg(long, short = 't')]
    pub thread: Option<String>,

    /// Settings file (default: ~/.agent_settings.json)
    #[arg(long, env = "HERALD_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Slack token file
    #[arg(long = "token-file", env = "HERALD_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Message text (markdown is converted to Slack formatting)
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AgentsArgs {
    /// Settings file (default: ~/.agent_settings.json)
    #[arg(long, env = "HERALD_SETTINGS")]
    pub settings: Option<PathBuf>,
}
