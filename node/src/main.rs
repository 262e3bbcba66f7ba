// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ARCA Devnet Node
//!
//! Entry point for the `arca-node` binary. Parses CLI arguments, initializes
//! logging and metrics, assembles a vault over an in-memory token ledger,
//! and serves the HTTP/WS API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the node
//! - `init`    — write a default vault configuration file
//! - `version` — print build version information

mod api;
mod auth;
mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use arca_contracts::{HoldStrategy, TokenLedger};
use arca_protocol::config::MIN_ADMIN_TOKEN_LEN;
use arca_protocol::{Address, Vault, VaultConfig};

use auth::Credentials;
use cli::{ArcaNodeCli, Commands};
use logging::LogFormat;
use metrics::VaultMetrics;

/// Broadcast channel capacity for live event streaming.
/// 256 is large enough to absorb short bursts without dropping events
/// for connected WebSocket clients.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Identity the devnet faucet mints as.
const FAUCET_ISSUER: &str = "arca:faucet";

/// Decimal places of the devnet asset. Display only.
const ASSET_DECIMALS: u8 = 6;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ArcaNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_config(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "arca_node=info,arca_protocol=info,arca_contracts=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    let config = match &args.config {
        Some(path) => VaultConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => VaultConfig::default(),
    };

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        vault = %config.vault_address,
        policy = ?config.allowance_policy,
        "starting arca-node"
    );

    // --- Asset & strategy ---
    let ledger = Arc::new(TokenLedger::new(
        args.asset_symbol.clone(),
        ASSET_DECIMALS,
        FAUCET_ISSUER,
    ));
    let strategy = Arc::new(HoldStrategy::new(
        args.strategy_id.clone(),
        config.vault_address.clone(),
        ledger.clone(),
    ));

    // --- Vault ---
    let vault = Vault::new(&config, ledger.clone(), strategy, config.authority())
        .context("failed to initialize vault")?;

    // --- Metrics ---
    let vault_metrics = Arc::new(VaultMetrics::new().context("failed to register metrics")?);

    // --- Credentials ---
    let credentials = Arc::new(admin_credentials(&config, args.admin_token.clone())?);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    vault.add_event_sink(Arc::new(api::BroadcastSink::new(event_tx.clone())));

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            arca_protocol::config::PROTOCOL_VERSION,
        ),
        network: "devnet".to_string(),
        vault,
        ledger,
        issuer: Address::from(FAUCET_ISSUER),
        credentials,
        event_tx,
        metrics: Arc::clone(&vault_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&vault_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("arca-node stopped");
    Ok(())
}

/// Binds the admin token to the first configured admin. Without a token
/// from the CLI or the config file, a random one is generated and logged.
fn admin_credentials(config: &VaultConfig, cli_token: Option<String>) -> Result<Credentials> {
    let admin = config
        .admins
        .iter()
        .find(|admin| !admin.is_empty())
        .context("config names no admin")?;

    let token = match cli_token.or_else(|| config.admin_token.clone()) {
        Some(token) if token.len() < MIN_ADMIN_TOKEN_LEN => {
            bail!("admin token must be at least {MIN_ADMIN_TOKEN_LEN} characters");
        }
        Some(token) => token,
        None => {
            let token = uuid::Uuid::new_v4().simple().to_string();
            tracing::warn!(%admin, %token, "no admin token configured; generated one for this run");
            token
        }
    };

    let credentials = Credentials::new();
    credentials
        .insert(token, admin)
        .with_context(|| format!("failed to register admin {admin}"))?;
    Ok(credentials)
}

/// Writes the default vault configuration.
fn init_config(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("arca_node=info", LogFormat::Pretty);

    let config = VaultConfig::default();
    write_config(&config, &args.output, args.force)?;
    tracing::info!(path = %args.output.display(), "vault config written");

    println!("Config initialized successfully.");
    println!("  Path           : {}", args.output.display());
    println!("  Vault address  : {}", config.vault_address);
    println!("  Allowance      : {:?}", config.allowance_policy);
    println!("  Admins         : {}", config.admins.len());

    Ok(())
}

fn write_config(config: &VaultConfig, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    config
        .save(path)
        .with_context(|| format!("failed to write config to {}", path.display()))
}

/// Prints version information to stdout.
fn print_version() {
    println!("arca-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", arca_protocol::config::PROTOCOL_VERSION);
    println!("rustc     {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that signal source is ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
