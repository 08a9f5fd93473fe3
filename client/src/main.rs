use clap::Parser;
use client::console::Console;
use client::network::{Client, ClientConfig};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:9999")]
    server: String,

    /// Seconds between heartbeats once logged in
    #[arg(long, default_value_t = shared::HEARTBEAT_INTERVAL.as_secs())]
    heartbeat_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ClientConfig {
        server_addr: args.server,
        heartbeat_interval: Duration::from_secs(args.heartbeat_secs),
    };

    info!("Starting client...");
    info!("Talking to: {}", config.server_addr);

    let console = Arc::new(Console::stdout());
    let client = Client::connect(&config, console).await?;

    tokio::select! {
        result = client.run_shell(BufReader::new(tokio::io::stdin())) => {
            if let Err(e) = result {
                error!("Error reading input: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
    }

    client.shutdown().await;

    // A pending stdin read holds a blocking thread the runtime would wait on
    std::process::exit(0)
}
