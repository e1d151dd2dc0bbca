//! OPC UA server exposing a namespace of DIU devices.
//!
//! Each DIU is an object under the server's Objects folder with seven child
//! variables. A counter task keeps writing into DIU1's local value so that
//! subscribed clients see regular data changes.

pub mod config;
pub mod error;
pub mod opcua_server;
pub mod simulator;
pub mod ws_bridge;
