use serde::{Deserialize, Serialize};

/// Point-in-time copy of one DIU's variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiuSnapshot {
    pub id: u32,
    pub name: String,
    pub device_id: u32,
    pub local_value: u32,
    pub remote_value: f64,
    pub correction: f64,
    pub calibrate_signal: f64,
    pub calibrate_time: f64,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub counter: u32,
    pub devices: Vec<DiuSnapshot>,
}
