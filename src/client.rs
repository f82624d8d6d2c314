use std::time::Duration;

use clap::{Parser, Subcommand};
use kv_rendezvous::{ClientConfig, KvsClient, Result};
use tracing_subscriber::EnvFilter;

/// Talk to a write-once key value store server
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    config: ClientConfig,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set a value for a key that has none yet
    Set { key: String, value: String },
    /// Get a value, waiting for it to be set
    Get {
        key: String,
        /// Wait budget, defaults to --timeout-ms
        #[arg(long)]
        wait_ms: Option<u64>,
    },
    /// Set key1 then read it twice, the second read is served from cache
    Demo,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KVS_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        std::process::exit(err.status().code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut client = KvsClient::connect(cli.config.addr(), &cli.config).await?;

    match cli.command {
        Command::Set { key, value } => {
            println!("SetValue({key:?}, {value:?})");
            client.set(key, value).await
        }
        Command::Get { key, wait_ms } => {
            let value = match wait_ms {
                Some(ms) => client.get_with_timeout(&key, Duration::from_millis(ms)).await?,
                None => client.get(&key).await?,
            };
            println!("GetValue({key:?}) -> {value:?}");
            Ok(())
        }
        Command::Demo => {
            println!("SetValue(\"key1\", \"mykey1\")");
            client.set("key1", "mykey1").await?;
            for _ in 0..2 {
                let hits = client.interceptor().hits();
                let value = client.get("key1").await?;
                let cached = if client.interceptor().hits() > hits { " (cached)" } else { "" };
                println!("GetValue(\"key1\") -> {value:?}{cached}");
            }
            Ok(())
        }
    }
}
