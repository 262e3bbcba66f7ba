//! # CLI Interface
//!
//! Defines the command-line argument structure for `arca-node` using
//! `clap` derive. Supports three subcommands: `run`, `init`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use arca_protocol::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT};

/// ARCA devnet node.
///
/// Hosts a single vault over an in-memory token ledger, serves the REST
/// and WebSocket API, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "arca-node",
    about = "ARCA vault devnet node",
    version,
    propagate_version = true
)]
pub struct ArcaNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the ARCA node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Write a default vault configuration file.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the vault configuration file (JSON).
    ///
    /// When omitted, the built-in defaults are used.
    #[arg(long, short = 'c', env = "ARCA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "ARCA_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ARCA_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "ARCA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Ticker of the devnet asset.
    #[arg(long, default_value = "AUSD")]
    pub asset_symbol: String,

    /// Identity of the strategy the vault starts with.
    #[arg(long, default_value = "arca:hold-0")]
    pub strategy_id: String,

    /// Bearer token bound to the first configured admin. Overrides
    /// `admin_token` from the config file.
    #[arg(long, env = "ARCA_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the configuration file.
    #[arg(long, short = 'o', env = "ARCA_CONFIG", default_value = "arca.json")]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}
