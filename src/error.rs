use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiuError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("OPC UA server could not be built from the supplied configuration")]
    ServerBuild,

    #[error("Failed to register namespace: {0}")]
    NamespaceRegistration(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DiuError>;
