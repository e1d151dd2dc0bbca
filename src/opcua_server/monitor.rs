use opcua::client::prelude::*;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

const PUBLISHING_INTERVAL_MS: f64 = 100.0;

/// Watch `node_id` on the server at `endpoint_url` and log every data change.
///
/// The client runs its own runtime, so it lives on a dedicated thread. Its
/// certificate and key are kept in `pki_dir`. A failed connection is logged
/// and ends the thread; it never takes the server down.
pub fn spawn_monitor(
    endpoint_url: String,
    node_id: NodeId,
    pki_dir: PathBuf,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("diu-monitor".to_string())
        .spawn(move || {
            // give the server a moment to open its listener
            std::thread::sleep(Duration::from_secs(2));
            if let Err(status) = run_monitor(&endpoint_url, node_id, &pki_dir) {
                tracing::error!("Data change monitor stopped: {}", status);
            }
        })
}

fn run_monitor(endpoint_url: &str, node_id: NodeId, pki_dir: &Path) -> Result<(), StatusCode> {
    tracing::info!("Monitor connecting to {}", endpoint_url);

    let mut client = ClientBuilder::new()
        .application_name("DIU Monitor")
        .application_uri("urn:DIUMonitor")
        .create_sample_keypair(true)
        .pki_dir(pki_dir.to_path_buf())
        .trust_server_certs(true)
        .session_retry_limit(3)
        .client()
        .ok_or(StatusCode::BadConfigurationError)?;

    let session = client.connect_to_endpoint(
        (
            endpoint_url,
            SecurityPolicy::None.to_str(),
            MessageSecurityMode::None,
            UserTokenPolicy::anonymous(),
        ),
        IdentityToken::Anonymous,
    )?;

    {
        let session = session.read();
        let subscription_id = session.create_subscription(
            PUBLISHING_INTERVAL_MS,
            10,
            30,
            0,
            0,
            true,
            DataChangeCallback::new(|changed_monitored_items| {
                changed_monitored_items.iter().for_each(|item| log_data_change(item));
            }),
        )?;

        let items_to_create: Vec<MonitoredItemCreateRequest> = vec![node_id.clone().into()];
        session.create_monitored_items(
            subscription_id,
            TimestampsToReturn::Both,
            &items_to_create,
        )?;
        tracing::info!("Monitoring {} (subscription {})", node_id, subscription_id);
    }

    Session::run(session);
    Ok(())
}

fn log_data_change(item: &MonitoredItem) {
    let node_id = &item.item_to_monitor().node_id;
    match &item.last_value().value {
        Some(value) => {
            tracing::info!("Received DataChange event for node {}: {:?}", node_id, value)
        }
        None => {
            tracing::info!("Received DataChange event for node {} without a value", node_id)
        }
    }
}
