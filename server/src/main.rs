use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use server::store::{AccountStore, FileBackend, StoreFormat};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Account database file
    #[arg(short, long, default_value = "server_db.json")]
    db: PathBuf,

    /// Encoding of the account database
    #[arg(short, long, value_enum, default_value_t = StoreFormat::Json)]
    format: StoreFormat,

    /// Seconds of silence before a session is dropped
    #[arg(long, default_value_t = shared::SESSION_TTL.as_secs())]
    session_ttl: u64,

    /// Longest a receive blocks before maintenance runs, in milliseconds
    #[arg(long, default_value_t = shared::POLL_INTERVAL.as_millis() as u64)]
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        session_ttl: Duration::from_secs(args.session_ttl),
        poll_interval: Duration::from_millis(args.poll_interval_ms),
    };

    info!(
        "Using account database {} ({:?})",
        args.db.display(),
        args.format
    );
    let store = AccountStore::open_or_empty(Box::new(FileBackend::new(args.db, args.format)));

    let mut server = Server::new(&config, store).await?;
    server
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                Err(e) => {
                    error!("Cannot listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;

    info!("Closing server socket");
    Ok(())
}
