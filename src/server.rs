use clap::Parser;
use kv_rendezvous::{KvServer, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Running the write-once key value store server
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    config: ServerConfig,
}

#[tokio::main]
async fn main() {
    // Install global collector configured based on KVS_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KVS_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    info!(config = ?cli.config, "Starting server");

    let server = match KvServer::bind(&cli.config).await {
        Ok(server) => server,
        Err(err) => {
            error!(%err, "Failed to start server");
            std::process::exit(err.status().code());
        }
    };

    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(%err, "Failed to listen for ctrl-c");
            }
        })
        .await;
}
