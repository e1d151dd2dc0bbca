use clap::Parser;
use diu_server::config::Cli;
use diu_server::error::Result;
use diu_server::opcua_server::{self, DiuField, DiuServer};
use diu_server::simulator::CounterDriver;
use diu_server::ws_bridge;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        tracing::error!("DIU server failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    tracing::info!("Starting DIU OPC UA server");

    let period = cli.update_interval()?;
    let server = DiuServer::new(&cli)?;

    tracing::info!("Root node is: {}", opcua::server::prelude::NodeId::root_folder_id());
    tracing::info!("Children are:");
    for name in server.browse_root() {
        tracing::info!("    {}", name);
    }

    // Snapshots for the WebSocket feed
    let (tx, _rx) = broadcast::channel(100);

    if let Some(port) = cli.ws_port {
        let tx_ws = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = ws_bridge::start_ws_server(port, tx_ws).await {
                tracing::error!("WebSocket server error: {}", e);
            }
        });
    }

    let mut server_task = tokio::spawn(server.run());

    let driver = CounterDriver::new(server.devices().to_vec(), tx)?;
    let counter_task = tokio::spawn(driver.run(period));

    if cli.monitor {
        if let Some(diu) = server.devices().first() {
            let node_id = diu.variable_id(DiuField::LocalValue).clone();
            let pki_dir = Path::new(&cli.pki_dir).join("monitor");
            opcua_server::spawn_monitor(cli.endpoint.clone(), node_id, pki_dir)?;
        }
    }

    tracing::info!(
        "Serving {} DIU devices on {}",
        server.devices().len(),
        cli.endpoint
    );
    tracing::info!("Ctrl-C to exit");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
            server.abort();
            if tokio::time::timeout(Duration::from_secs(5), &mut server_task).await.is_err() {
                tracing::warn!("OPC UA server did not stop within 5s");
            }
        }
        _ = &mut server_task => {
            tracing::info!("OPC UA server terminated");
        }
    }

    counter_task.abort();
    tracing::info!("Shutting down");
    Ok(())
}
