use std::io;

/// Failures reported by a file-share transport.
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    /// The endpoint answered and refused the login or password.
    #[error("credentials rejected")]
    Rejected,

    /// Timeout, reset, refused and other socket level faults. Worth retrying.
    #[error("transport fault: {0}")]
    Transport(#[source] io::Error),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("share operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IQAir at {address} rejected the login or password")]
    Authentication { address: String },

    #[error("can't connect to IQAir at {address} after {attempts} attempts")]
    Connection {
        address: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("file '{path}' not found on IQAir")]
    DocumentNotFound { path: String },

    /// The measurements file is missing or is not valid JSON. Usually means the
    /// device runs a firmware whose export is not supported yet.
    #[error("measurements file on IQAir at {address} is missing or malformed")]
    MeasurementsUnavailable {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("IQAir data corrupted: {0}")]
    DataCorrupted(String),

    #[error(transparent)]
    Share(#[from] ShareError),

    #[error("MQTT broker is not connected")]
    BrokerNotConnected,

    #[error("failed to publish measurements: {0}")]
    Publish(#[from] rumqttc::ClientError),

    #[error("failed to encode measurements: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
