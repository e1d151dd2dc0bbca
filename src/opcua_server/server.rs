use crate::config::Cli;
use crate::error::{DiuError, Result};
use crate::opcua_server::diu::Diu;
use opcua::server::prelude::*;
use opcua::sync::RwLock;
use std::future::Future;
use std::sync::Arc;

/// An OPC UA server carrying one namespace of DIU devices.
pub struct DiuServer {
    server: Arc<RwLock<Server>>,
    address_space: Arc<RwLock<AddressSpace>>,
    namespace: u16,
    devices: Vec<Diu>,
}

impl DiuServer {
    pub fn new(cli: &Cli) -> Result<Self> {
        let endpoint = cli.endpoint()?;
        let device_ids = cli.device_ids()?;

        tracing::info!("Building OPC UA server for {}", cli.endpoint);

        let user_token_ids = vec![ANONYMOUS_USER_TOKEN_ID.to_string()];
        let server = ServerBuilder::new()
            .application_name(cli.application_name.as_str())
            .application_uri(cli.server_uri.as_str())
            .product_uri(cli.server_uri.as_str())
            .create_sample_keypair(true)
            .pki_dir(cli.pki_dir.as_str())
            .discovery_server_url(None)
            .host_and_port(endpoint.host.as_str(), endpoint.port)
            .discovery_urls(vec![endpoint.path.clone()])
            .endpoint(
                "none",
                ServerEndpoint::new_none(endpoint.path.as_str(), &user_token_ids),
            )
            .server()
            .ok_or(DiuError::ServerBuild)?;

        let address_space = server.address_space();
        let (namespace, devices) =
            populate(address_space.clone(), &cli.namespace_uri, &device_ids)?;

        Ok(Self {
            server: Arc::new(RwLock::new(server)),
            address_space,
            namespace,
            devices,
        })
    }

    pub fn namespace(&self) -> u16 {
        self.namespace
    }

    pub fn devices(&self) -> &[Diu] {
        &self.devices
    }

    pub fn device(&self, id: u32) -> Option<&Diu> {
        self.devices.iter().find(|diu| diu.id() == id)
    }

    pub fn address_space(&self) -> Arc<RwLock<AddressSpace>> {
        self.address_space.clone()
    }

    pub fn browse_root(&self) -> Vec<String> {
        browse(
            &self.address_space,
            &NodeId::root_folder_id(),
            ReferenceTypeId::Organizes,
        )
    }

    /// Future that accepts connections until [`DiuServer::abort`] is called.
    pub fn run(&self) -> impl Future<Output = ()> + Send + 'static {
        Server::new_server_task(self.server.clone())
    }

    pub fn abort(&self) {
        tracing::info!("Stopping OPC UA server");
        self.server.write().abort();
    }
}

/// Register `namespace_uri` and create one DIU per id, all in that namespace.
pub fn populate(
    address_space: Arc<RwLock<AddressSpace>>,
    namespace_uri: &str,
    device_ids: &[u32],
) -> Result<(u16, Vec<Diu>)> {
    let namespace = address_space
        .write()
        .register_namespace(namespace_uri)
        .map_err(|_e| DiuError::NamespaceRegistration(namespace_uri.to_string()))?;

    tracing::info!("Registered namespace {} at index {}", namespace_uri, namespace);

    let devices = device_ids
        .iter()
        .map(|id| Diu::new(address_space.clone(), namespace, *id))
        .collect::<Result<Vec<_>>>()?;

    Ok((namespace, devices))
}

/// Browse names of the nodes `parent` references with `reference_type`.
pub fn browse(
    address_space: &Arc<RwLock<AddressSpace>>,
    parent: &NodeId,
    reference_type: ReferenceTypeId,
) -> Vec<String> {
    let space = address_space.read();
    space
        .find_references(parent, Some((reference_type, false)))
        .unwrap_or_default()
        .iter()
        .filter_map(|reference| space.find_node(&reference.target_node))
        .map(|node| {
            let browse_name = node.as_node().browse_name();
            let name: &str = browse_name.name.as_ref();
            name.to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcua_server::diu::DiuField;
    use clap::Parser;
    use std::time::Duration;

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn populated(ids: &[u32]) -> (Arc<RwLock<AddressSpace>>, u16, Vec<Diu>) {
        let address_space = Arc::new(RwLock::new(AddressSpace::new()));
        let (ns, devices) =
            populate(address_space.clone(), "http://diu.freeopcua.github.io", ids).unwrap();
        (address_space, ns, devices)
    }

    #[test]
    fn test_four_devices_share_one_namespace() {
        let (_, ns, devices) = populated(&[1, 2, 3, 4]);

        assert_eq!(devices.len(), 4);
        let ids: Vec<u32> = devices.iter().map(Diu::id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(devices.iter().all(|diu| diu.namespace() == ns));
        assert_ne!(ns, 0);
    }

    #[test]
    fn test_device_objects_listed_under_objects_folder() {
        let (address_space, _, _) = populated(&[1, 2, 3, 4]);

        let names = browse(
            &address_space,
            &NodeId::objects_folder_id(),
            ReferenceTypeId::Organizes,
        );
        for name in ["DIU1", "DIU2", "DIU3", "DIU4"] {
            assert!(names.iter().any(|n| n == name), "{name} not browsable");
        }
    }

    #[test]
    fn test_browse_device_children() {
        let (address_space, _, devices) = populated(&[1]);

        let names = browse(
            &address_space,
            devices[0].object_id(),
            ReferenceTypeId::HasComponent,
        );
        let labels: Vec<String> = DiuField::ALL.iter().map(|f| f.label().to_string()).collect();
        assert_eq!(names.len(), 7);
        for label in labels {
            assert!(names.contains(&label), "{label} not browsable");
        }
    }

    #[test]
    fn test_browse_root_lists_standard_folders() {
        let (address_space, _, _) = populated(&[1]);

        let names = browse(
            &address_space,
            &NodeId::root_folder_id(),
            ReferenceTypeId::Organizes,
        );
        assert!(names.iter().any(|n| n == "Objects"));
        assert!(names.iter().any(|n| n == "Types"));
        assert!(names.iter().any(|n| n == "Views"));
    }

    #[test]
    fn test_duplicate_ids_fail_population() {
        let address_space = Arc::new(RwLock::new(AddressSpace::new()));
        let result = populate(address_space, "http://diu.test", &[1, 1]);
        assert!(matches!(result, Err(DiuError::NodeExists(_))));
    }

    #[test]
    fn test_new_builds_server_with_configured_devices() {
        let pki_dir = std::env::temp_dir().join(format!("diu-pki-{}", std::process::id()));
        let cli = Cli::try_parse_from([
            "diu_server",
            "--pki-dir",
            pki_dir.to_str().unwrap(),
            "--devices",
            "2",
        ])
        .unwrap();

        let server = DiuServer::new(&cli).unwrap();
        assert_eq!(server.devices().len(), 2);
        assert!(server.device(2).is_some());
        assert!(server.device(3).is_none());
        assert_eq!(server.device(1).unwrap().namespace(), server.namespace());
        assert!(server.browse_root().iter().any(|n| n == "Objects"));

        let _ = std::fs::remove_dir_all(pki_dir);
    }

    #[test]
    fn test_new_rejects_non_opc_tcp_endpoint() {
        let cli =
            Cli::try_parse_from(["diu_server", "--endpoint", "http://localhost:4841"]).unwrap();
        assert!(matches!(
            DiuServer::new(&cli),
            Err(DiuError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_returns_after_abort() {
        let pki_dir = std::env::temp_dir().join(format!("diu-pki-run-{}", std::process::id()));
        let endpoint = format!("opc.tcp://127.0.0.1:{}/diu/server", unused_port());
        let cli = Cli::try_parse_from([
            "diu_server",
            "--endpoint",
            endpoint.as_str(),
            "--pki-dir",
            pki_dir.to_str().unwrap(),
        ])
        .unwrap();

        let server = DiuServer::new(&cli).unwrap();
        let handle = tokio::spawn(server.run());

        // let the listener come up before stopping it
        tokio::time::sleep(Duration::from_millis(500)).await;
        server.abort();

        let finished = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(finished.is_ok(), "server task still running after abort");
        assert!(finished.unwrap().is_ok());

        let _ = std::fs::remove_dir_all(pki_dir);
    }
}
