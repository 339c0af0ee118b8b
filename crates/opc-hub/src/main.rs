use clap::Parser;
use opc_core::parse_bool_flag;
use opc_hub::{serve, HubState, Snapshot, DEFAULT_HUB_ADDR};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "opc-hub", about = "Local snapshot and push hub for the ops console")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    /// JSON file seeding the snapshot endpoints.
    #[arg(long)]
    fixture: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug || env_true("OPC_HUB_DEBUG"));

    let addr_raw = resolve_addr(&args.addr);
    let addr: SocketAddr = match addr_raw.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %addr_raw);
            anyhow::bail!("invalid hub address {addr_raw}");
        }
    };
    if !addr.ip().is_loopback() {
        error!(event = "invalid_addr", addr = %addr_raw, "hub only binds loopback addresses");
        anyhow::bail!("refusing non-loopback address {addr_raw}");
    }

    let snapshot = match &args.fixture {
        Some(path) => Snapshot::load(path)?,
        None => Snapshot::default(),
    };
    info!(
        event = "fixture_loaded",
        agents = snapshot.agents.len(),
        issues = snapshot.issues.len(),
        prs = snapshot.prs.len(),
        worktrees = snapshot.worktrees.len(),
        deployments = snapshot.deployments.len(),
        logs = snapshot.logs.len()
    );

    let hub = Arc::new(HubState::new(snapshot));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(event = "hub_start", addr = %addr);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "hub_shutdown");
    };
    if let Err(err) = serve(listener, hub, shutdown).await {
        error!(event = "hub_error", error = %err);
        return Err(err.into());
    }
    Ok(())
}

fn init_logging(debug: bool) {
    let level = if debug {
        "debug".to_string()
    } else {
        std::env::var("OPC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn env_true(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false)
}

fn resolve_addr(addr_flag: &str) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    if let Ok(value) = std::env::var("OPC_HUB_ADDR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    DEFAULT_HUB_ADDR.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_true_follows_shared_flag_spellings() {
        std::env::set_var("OPC_HUB_TEST_FLAG_ON", "On");
        std::env::set_var("OPC_HUB_TEST_FLAG_BAD", "sure");
        assert!(env_true("OPC_HUB_TEST_FLAG_ON"));
        assert!(!env_true("OPC_HUB_TEST_FLAG_BAD"));
        assert!(!env_true("OPC_HUB_TEST_FLAG_UNSET"));
    }
}
