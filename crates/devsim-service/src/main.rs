// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `devsim`: Unix-socket device simulator.
//!
//! `devsim serve` listens on a socket and plays the configured rules to each
//! client in turn; `devsim plan` prints what those rules would do against
//! the current data directory.
#![allow(clippy::print_stdout)]

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use devsim_config::{ConfigFormat, DeviceConfig, RulePlan, SkippedRule};
use devsim_engine::{default_socket_path, DeviceServer, DirSource, FileSource};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Unix-socket device simulator")]
struct Cli {
    /// Tracing filter (e.g. `info,devsim_engine=debug`); defaults to RUST_LOG, then `info`
    #[arg(long, global = true, env = "DEVSIM_LOG")]
    log: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Listen on a Unix socket and play the configured rules to each client
    Serve(ServeArgs),
    /// Print each rule's trigger, behavior, and currently matching files
    Plan(PlanArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// YAML rule file
    config: PathBuf,
    /// Unix socket to listen on (defaults to $XDG_RUNTIME_DIR/devsim.sock)
    #[arg(env = "DEVSIM_SOCKET")]
    socket: Option<PathBuf>,
    /// Directory rule patterns are matched against
    #[arg(long, env = "DEVSIM_DATA_DIR", default_value = ".")]
    dir: PathBuf,
    /// Exit after the first client disconnects
    #[arg(long)]
    once: bool,
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// YAML rule file
    config: PathBuf,
    /// Directory rule patterns are matched against
    #[arg(long, env = "DEVSIM_DATA_DIR", default_value = ".")]
    dir: PathBuf,
    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct PlanReport<'a> {
    format: ConfigFormat,
    rules: &'a [RulePlan],
    skipped: &'a [SkippedRule],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log {
        Some(directives) => EnvFilter::try_new(directives).context("parse --log filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Plan(args) => print_plan(&args),
    }
}

fn load_config(path: &Path) -> Result<DeviceConfig> {
    devsim_config::load(path).with_context(|| format!("load rules from {}", path.display()))
}

fn print_plan(args: &PlanArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let source = DirSource::new(&args.dir);
    let plans = devsim_config::plan(&config.rules, &source);

    if args.json {
        let report = PlanReport {
            format: config.format,
            rules: &plans,
            skipped: &config.skipped,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} rule(s) from {} against {}",
        plans.len(),
        args.config.display(),
        args.dir.display()
    );
    for plan in &plans {
        println!("{plan}");
    }
    for skipped in &config.skipped {
        println!("skipped entry {}: {}", skipped.index + 1, skipped.reason);
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    if config.rules.is_empty() {
        bail!("no usable rules in {}", args.config.display());
    }

    let source: Arc<dyn FileSource> = Arc::new(DirSource::new(&args.dir));
    preflight(&config, source.as_ref());

    let socket = args.socket.unwrap_or_else(default_socket_path);
    remove_stale_socket(&socket)?;
    let listener = UnixListener::bind(&socket)
        .with_context(|| format!("bind {}", socket.display()))?;
    info!(socket = %socket.display(), dir = %args.dir.display(), "device simulator listening");

    let (stop_tx, stop_rx) = watch::channel(false);
    // graceful shutdown on Ctrl+C
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = stop_tx.send(true);
            }
            Err(err) => warn!(%err, "ctrl-c handler unavailable"),
        }
    });

    let server = DeviceServer::new(config.rules, source);
    let sessions = server.serve(&listener, stop_rx, args.once).await;

    drop(listener);
    if let Err(err) = std::fs::remove_file(&socket) {
        warn!(%err, socket = %socket.display(), "could not remove socket");
    }
    info!(sessions, "device simulator stopped");
    Ok(())
}

fn preflight(config: &DeviceConfig, source: &dyn FileSource) {
    for plan in devsim_config::plan(&config.rules, source) {
        match &plan.error {
            None => info!(
                rule = plan.rule,
                pattern = %plan.pattern,
                trigger = %plan.trigger,
                behavior = %plan.behavior,
                delay_ms = plan.delay_ms,
                files = plan.files.len(),
                "rule ready"
            ),
            Some(err) => warn!(
                rule = plan.rule,
                pattern = %plan.pattern,
                %err,
                "rule will be disabled unless matching files appear before it activates"
            ),
        }
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(socket = %path.display(), "removed stale socket");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove stale socket {}", path.display())),
    }
}
