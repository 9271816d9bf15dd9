//! A runnable `vaultfs` server: loads a [`vaultfs::config::VaultConfig`],
//! opens a provider over the configured store, and serves RPCs over
//! mutual TLS until interrupted.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use vaultfs::config::{self, VaultConfig};
use vaultfs::provider::{DataSourceSink, Provider};
use vaultfs::server::Manager;
use vaultfs::store::{FanoutChunkStore, SledChunkStore};
use vaultfs::tls;

#[derive(Parser)]
#[command(name = "vaultfs-server", about = "Serves a vaultfs store over mutual-TLS RPC")]
struct Args {
    /// Path to a TOML file matching `vaultfs::config::VaultConfig`.
    #[arg(long)]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let config: VaultConfig = config::load(&args.config)?;

    let provider: Arc<dyn DataSourceSink> = if config.fanout_chunks {
        let chunks = FanoutChunkStore::open(config.data_dir.join("chunks")).await?;
        Arc::new(Provider::open(&config.data_dir, chunks).await?)
    } else {
        let chunks = SledChunkStore::open(config.data_dir.join("chunks.db"))?;
        Arc::new(Provider::open(&config.data_dir, chunks).await?)
    };

    let tls_config = tls::server_config(&config.cert_path, &config.key_path, &config.ca_cert_path)?;
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "vaultfs-server listening");

    let manager = Manager::new(listener, tls_config, provider);
    let shutdown = manager.shutdown_handle();

    let serve = tokio::spawn(async move { manager.serve().await });
    signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.store(false, std::sync::atomic::Ordering::Relaxed);
    let _ = serve.await;
    Ok(())
}
