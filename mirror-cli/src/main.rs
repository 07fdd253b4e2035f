// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, Result};
use circle_mirror::chain_client::JsonRpcLedgerClient;
use circle_mirror::config::MirrorNodeConfig;
use circle_mirror::node::MirrorNode;
use circle_mirror::notify::NoopNotifier;
use clap::{Parser, Subcommand};
use mirror_config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "mirror-cli", about = "Circle ledger mirror node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the mirror node until interrupted
    Run {
        /// Path to the node config (YAML or JSON)
        #[arg(long)]
        config: PathBuf,
    },
    /// Write a config template to a file
    GenerateConfig {
        #[arg(long)]
        path: PathBuf,
    },
    /// Resync one group (or everything) against canonical chain state,
    /// then print the health report
    Resync {
        #[arg(long)]
        config: PathBuf,
        /// Group address; omit to resync all groups
        #[arg(long)]
        group: Option<String>,
    },
    /// Print the sync health report
    Health {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config } => run_node(&config).await,
        Command::GenerateConfig { path } => {
            MirrorNodeConfig::default().save(&path)?;
            info!("Config template written to {}", path.display());
            Ok(())
        }
        Command::Resync { config, group } => {
            let node = start_node(&config).await?;
            let report = node
                .health()
                .trigger_resync(group.as_deref())
                .await
                .map_err(|e| anyhow!("resync failed: {}", e))?;
            println!("resynced: {} ok, {} failed", report.synced, report.failed);
            node.shutdown().await;
            Ok(())
        }
        Command::Health { config } => {
            let node = start_node(&config).await?;
            let report = node.health().report().await;
            println!(
                "head={} processed={} lag={} caught_up={} groups={} activities={} errors={}",
                report.chain_head,
                report.last_processed_block,
                report.lag_blocks,
                report.caught_up,
                report.group_count,
                report.activity_count,
                report.consecutive_sync_errors,
            );
            node.shutdown().await;
            Ok(())
        }
    }
}

async fn start_node(config_path: &PathBuf) -> Result<MirrorNode> {
    let config = MirrorNodeConfig::load(config_path)?;
    let client = Arc::new(JsonRpcLedgerClient::new(
        &config.ledger_rpc_url,
        config.rpc_timeout(),
    )?);
    let node = MirrorNode::start(config, client, Arc::new(NoopNotifier))
        .await
        .map_err(|e| anyhow!("node start failed: {}", e))?;
    Ok(node)
}

async fn run_node(config_path: &PathBuf) -> Result<()> {
    let node = start_node(config_path).await?;
    info!("Mirror node running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    node.shutdown().await;
    Ok(())
}
