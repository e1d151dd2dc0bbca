//! Command line and environment configuration.
//!
//! Every setting has a default matching the stock DIU server, so running the
//! binary without arguments serves `opc.tcp://localhost:4841/diu/server` with
//! four devices and a five second counter.

use crate::error::{DiuError, Result};
use clap::Parser;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "opc.tcp://localhost:4841/diu/server";
pub const DEFAULT_SERVER_URI: &str = "urn://diuseserver.freeopcua.github.io";
pub const DEFAULT_NAMESPACE_URI: &str = "http://diu.freeopcua.github.io";

/// IANA registered port for opc.tcp, used when the endpoint URL omits one.
pub const OPC_TCP_DEFAULT_PORT: u16 = 4840;

const OPC_TCP_SCHEME: &str = "opc.tcp://";

#[derive(Parser, Debug, Clone)]
#[command(name = "diu_server", version, about = "OPC UA server exposing DIU devices")]
pub struct Cli {
    /// Endpoint URL clients connect to
    #[arg(long, env = "DIU_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Application URI of the server
    #[arg(long, env = "DIU_SERVER_URI", default_value = DEFAULT_SERVER_URI)]
    pub server_uri: String,

    #[arg(long, env = "DIU_APPLICATION_NAME", default_value = "DIU Server")]
    pub application_name: String,

    /// Namespace the DIU nodes are registered under
    #[arg(long, env = "DIU_NAMESPACE_URI", default_value = DEFAULT_NAMESPACE_URI)]
    pub namespace_uri: String,

    /// Number of DIU devices, numbered from 1
    #[arg(long, env = "DIU_DEVICES", default_value_t = 4)]
    pub devices: u32,

    /// Seconds between counter updates on DIU1
    #[arg(long, env = "DIU_UPDATE_INTERVAL", default_value_t = 5)]
    pub update_interval: u64,

    /// Directory holding the server certificate and private key
    #[arg(long, env = "DIU_PKI_DIR", default_value = "./pki-diu")]
    pub pki_dir: String,

    /// Subscribe to DIU1's local value and log every data change
    #[arg(long, env = "DIU_MONITOR")]
    pub monitor: bool,

    /// Serve JSON snapshots over WebSocket on this port
    #[arg(long, env = "DIU_WS_PORT")]
    pub ws_port: Option<u16>,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Cli {
    pub fn endpoint(&self) -> Result<Endpoint> {
        parse_endpoint(&self.endpoint)
    }

    pub fn device_ids(&self) -> Result<Vec<u32>> {
        if self.devices == 0 {
            return Err(DiuError::InvalidConfig(
                "at least one device is required".to_string(),
            ));
        }
        Ok((1..=self.devices).collect())
    }

    pub fn update_interval(&self) -> Result<Duration> {
        if self.update_interval == 0 {
            return Err(DiuError::InvalidConfig(
                "update interval must be at least one second".to_string(),
            ));
        }
        Ok(Duration::from_secs(self.update_interval))
    }
}

/// Split an `opc.tcp://host[:port][/path]` URL into its parts.
pub fn parse_endpoint(url: &str) -> Result<Endpoint> {
    let invalid = || DiuError::InvalidEndpoint(url.to_string());

    let rest = url.strip_prefix(OPC_TCP_SCHEME).ok_or_else(invalid)?;
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_e| invalid())?),
        None => (authority, OPC_TCP_DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(invalid());
    }

    Ok(Endpoint {
        host: host.to_string(),
        port,
        path: path.to_string(),
    })
}
