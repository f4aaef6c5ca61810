//! Isolate broker - hosts the service isolate and serves clients over TCP.

use clap::Parser;
use isolate_ipc::ipc::IpcServer;
use isolate_ipc::{Config, IsolateHost};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "isolate-broker", version, about = "Cross-isolate service broker")]
struct Args {
    /// JSON configuration file. Defaults apply to anything it omits.
    #[arg(short, long, env = "ISOLATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override `server.listen_addr`.
    #[arg(short, long, env = "ISOLATE_LISTEN_ADDR")]
    listen: Option<String>,

    /// Emit JSON logs.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_json(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if args.json_logs {
        config.observability.json_logs = true;
    }

    // Initialize observability
    isolate_ipc::observability::init_tracing_with(&config.observability);

    let addr: SocketAddr = config.server.listen_addr.parse()?;
    let host = Arc::new(IsolateHost::new(config)?);
    let server = Arc::new(IpcServer::new(host.clone(), addr));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, shutting down");
                signal_server.shutdown();
            }
            Err(e) => tracing::error!("cannot listen for ctrl-c: {}", e),
        }
    });

    tracing::info!("isolate broker starting on {}", addr);
    server.serve().await?;
    host.shutdown().await;

    let stats = host.dispatcher().stats().await;
    tracing::info!(
        sessions_opened = stats.sessions_opened,
        requests_dispatched = stats.requests_dispatched,
        "isolate broker stopped"
    );
    Ok(())
}
