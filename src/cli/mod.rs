//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// BACnet snapshot replay - serve captured devices as a virtual routed network.
///
/// Robot Mode: Use --robot or --format json for machine-parseable output.
#[derive(Parser, Debug)]
#[command(name = "bacreplay", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (text for humans, json for scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "BACREPLAY_FORMAT"
    )]
    pub format: OutputFormat,

    /// Robot mode: equivalent to --format=json, with JSON logs
    #[arg(long, global = true)]
    pub robot: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON (robot mode or explicit --format=json).
    pub const fn use_json(&self) -> bool {
        self.robot || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay snapshot devices as a router and its virtual segment
    Replay(ReplayArgs),

    /// Print snapshot records
    Dump(DumpArgs),

    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for a replay run.
///
/// # Examples
///
/// ```bash
/// # Device 100 routes to network 20, devices 200 and 201 sit behind it
/// bacreplay replay site.db 192.168.0.10/24 10 20 100 200 201
///
/// # Register as a foreign device with a BBMD
/// bacreplay replay site.db 192.168.0.10/24 10 20 100 --foreign 192.168.1.1
/// ```
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Snapshot database file
    #[arg(value_name = "DB")]
    pub db: PathBuf,

    /// Router's BACnet/IP address, host[/prefix][:port]
    #[arg(value_name = "ADDR")]
    pub addr: String,

    /// Network number of the local (external) network
    #[arg(value_name = "NET1")]
    pub net1: u16,

    /// Network number of the virtual segment
    #[arg(value_name = "NET2")]
    pub net2: u16,

    /// Device identifiers; the first is the router, the rest are peers
    #[arg(value_name = "DEVID", required = true, num_args = 1..)]
    pub devids: Vec<u32>,

    /// Run as a BBMD with these peer addresses
    #[arg(long, value_name = "PEER", num_args = 1.., conflicts_with = "foreign")]
    pub bbmd: Option<Vec<String>>,

    /// Register as a foreign device with this BBMD
    #[arg(long, value_name = "ADDR")]
    pub foreign: Option<String>,

    /// Foreign registration time-to-live in seconds (default 30)
    #[arg(long, value_name = "SECS", requires = "foreign")]
    pub ttl: Option<u16>,

    /// Settings file (.toml or .yaml)
    #[arg(long, short = 'c', value_name = "FILE", env = "BACREPLAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run without the operator console; stop with Ctrl-C
    #[arg(long)]
    pub no_console: bool,
}

/// Arguments for dumping a snapshot.
#[derive(Parser, Debug)]
pub struct DumpArgs {
    /// Snapshot database file
    #[arg(value_name = "DB")]
    pub db: PathBuf,

    /// Device identifier filter ("-" for any)
    #[arg(default_value = "-")]
    pub devid: String,

    /// Object identifier filter ("-" for any)
    #[arg(default_value = "-")]
    pub objid: String,

    /// Property identifier filter ("-" for any)
    #[arg(default_value = "-")]
    pub propid: String,

    /// Print row counts per device instead of records
    #[arg(long, short = 's')]
    pub summary: bool,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
