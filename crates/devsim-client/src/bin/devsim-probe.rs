// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Debug probe: connect to a running simulator, send trigger messages, and
//! log every chunk that comes back.

use anyhow::{Context, Result};
use clap::Parser;
use devsim_client::DeviceClient;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Device simulator debug probe")]
struct Args {
    /// Unix socket the simulator listens on
    socket: PathBuf,
    /// Number of trigger messages to send
    #[arg(long, default_value_t = 5)]
    triggers: u32,
    /// Payload prefix for trigger messages (the index is appended)
    #[arg(long, default_value = "trigger_")]
    payload: String,
    /// Pause between triggers, in milliseconds
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,
    /// Quiet period that ends each receive phase, in milliseconds
    #[arg(long, default_value_t = 1000)]
    quiet_ms: u64,
    /// Stop a receive phase after this many chunks (continuous rules never go quiet)
    #[arg(long, default_value_t = 20)]
    max_chunks: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let mut client = DeviceClient::connect(&args.socket)
        .await
        .with_context(|| format!("connect to {}", args.socket.display()))?;
    info!(socket = %args.socket.display(), "connected");

    let quiet = Duration::from_millis(args.quiet_ms);
    let immediate = receive_phase(&mut client, quiet, args.max_chunks, "immediate").await?;
    info!(chunks = immediate, "immediate phase done");

    for i in 1..=args.triggers {
        let payload = format!("{}{i}", args.payload);
        client.send(payload.as_bytes()).await?;
        info!(trigger = i, "sent");
        let chunks = receive_phase(&mut client, quiet, args.max_chunks, "trigger").await?;
        info!(trigger = i, chunks, "responses");
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    let trailing = receive_phase(&mut client, quiet, args.max_chunks, "trailing").await?;
    info!(chunks = trailing, "done");
    Ok(())
}

async fn receive_phase(
    client: &mut DeviceClient,
    quiet: Duration,
    max_chunks: u32,
    phase: &str,
) -> Result<u32> {
    let mut chunks = 0;
    while chunks < max_chunks {
        let Some(chunk) = client.recv(quiet).await? else {
            break;
        };
        chunks += 1;
        info!(phase, chunk = chunks, bytes = chunk.len(), "received");
    }
    Ok(chunks)
}
