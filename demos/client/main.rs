//! A runnable `vaultfs` client: connects to a server over mutual TLS and
//! issues one RPC named on the command line, printing the result.

use clap::{Parser, Subcommand};
use tracing::info;

use vaultfs::client::RemoteSource;
use vaultfs::config::{self, ClientConfig};
use vaultfs::tls;

#[derive(Parser)]
#[command(name = "vaultfs-client", about = "Issues one RPC against a vaultfs server")]
struct Args {
    /// Path to a TOML file matching `vaultfs::config::ClientConfig`.
    #[arg(long)]
    config: std::path::PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Lookup { path: String },
    List { path: String },
    Fetch { path: String },
    Store { path: String, text: String },
    Mkdir { path: String },
    Delete { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let config: ClientConfig = config::load(&args.config)?;

    let tls_config = tls::client_config(&config.cert_path, &config.key_path, &config.ca_cert_path)?;
    let remote = RemoteSource::open(&config.server_addr, &config.server_name, tls_config, config.keepalive(), None)
        .await?
        .with_timeout(config.timeout());
    info!(addr = %config.server_addr, "connected");

    match args.command {
        Command::Lookup { path } => {
            let entry_id = remote.lookup(&path).await?;
            println!("{entry_id:?}");
        }
        Command::List { path } => {
            let entries = remote.list(&path).await?;
            for entry in entries {
                println!("{}\t{}", if entry.is_dir { "dir" } else { "file" }, entry.name);
            }
        }
        Command::Fetch { path } => {
            let (_, meta, bytes) = remote.fetch(&path).await?;
            println!("# {} bytes, size={}", bytes.len(), meta.size);
            std::io::Write::write_all(&mut std::io::stdout(), &bytes)?;
        }
        Command::Store { path, text } => {
            let (entry_id, meta) = remote.store(&path, text.as_bytes()).await?;
            println!("{entry_id:?} size={}", meta.size);
        }
        Command::Mkdir { path } => {
            let (entry_id, _) = remote.mkdir(&path).await?;
            println!("{entry_id:?}");
        }
        Command::Delete { path } => {
            remote.delete(&path).await?;
            println!("ok");
        }
    }

    Ok(())
}
