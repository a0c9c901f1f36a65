//! Bridge probe
//!
//! Opens each model path given on the command line through one bridge
//! connection and prints every reply as a JSON line.
//!
//! Environment:
//! - `BRIDGE_PROBE_TIMEOUT_SECS`: how long to wait for each reply (default 30)
//! - `BRIDGE_PROBE_LOG_JSON`: set to `1` for JSON logs
//! - `CNN_BRIDGE_*`: bridge configuration, see `BridgeConfig::from_env`

use anyhow::{bail, Context, Result};
use bridge_core::env_or;
use cnn_bridge::{registry, BridgeConfig, Connection, Mailbox, ModelFileEngine, Ref};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    if env_or("BRIDGE_PROBE_LOG_JSON", 0u8) == 1 {
        bridge_core::init_tracing_json("bridge-probe");
    } else {
        bridge_core::init_tracing("bridge-probe");
    }

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: bridge-probe <model-path>...");
    }

    let timeout = Duration::from_secs(env_or("BRIDGE_PROBE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS));
    let config = BridgeConfig::from_env();
    info!(models = paths.len(), profile = %config.profile, "Starting bridge probe");

    registry::load();
    let conn = Connection::start(Arc::new(ModelFileEngine), config)
        .context("failed to start bridge connection")?;
    let mut mailbox = Mailbox::new();

    let mut pending = Vec::with_capacity(paths.len());
    for path in &paths {
        let token = Ref::new();
        conn.open(token, &mailbox.pid(), path)
            .with_context(|| format!("failed to queue open of {path}"))?;
        pending.push((token, path));
    }

    let mut failures = 0usize;
    for (token, path) in pending {
        let reply = tokio::time::timeout(timeout, mailbox.recv())
            .await
            .with_context(|| format!("no reply for {path} within {timeout:?}"))?
            .context("mailbox closed")?;

        // One connection processes its commands in order
        if reply.token != token {
            bail!("reply out of order: expected {token}, got {}", reply.token);
        }
        if let Err(e) = &reply.result {
            warn!(path = %path, error = %e, "Open failed");
            failures += 1;
        }
        println!("{}", reply.to_json()?);
    }

    // Teardown joins the worker thread; keep it off the host thread
    tokio::task::spawn_blocking(move || drop(conn))
        .await
        .context("connection teardown panicked")?;

    info!(failures, "Bridge probe finished");
    if failures > 0 {
        bail!("{failures} of {} models failed to open", paths.len());
    }
    Ok(())
}
