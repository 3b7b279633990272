use std::{io, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, ShareError};

/// The export the device refreshes with its latest readings.
pub const MEASUREMENTS_FILE_PATH: &str = "/latest_config_measurements.json";

pub const CONNECTION_ATTEMPTS: u32 = 3;

pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(3);

/// Opens sessions to the file share exported by the device.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Address used in logs and errors.
    fn address(&self) -> &str;

    async fn connect(&self) -> Result<Self::Session, ShareError>;
}

/// A live session. Dropping it closes the connection.
#[async_trait]
pub trait Session: Send {
    /// Appends the content of the file at `path` to `buffer`, returning the
    /// number of bytes read.
    async fn retrieve_file(&mut self, path: &str, buffer: &mut Vec<u8>)
    -> Result<u64, ShareError>;
}

/// Talks to the IQAir device.
///
/// Every operation opens its own session and closes it before returning,
/// whatever the outcome.
#[derive(Debug)]
pub struct DeviceClient<C> {
    connector: C,
    attempts: u32,
    attempt_timeout: Duration,
}

impl<C: Connector> DeviceClient<C> {
    pub async fn new(connector: C) -> Result<Self> {
        Self::with_retry_policy(connector, CONNECTION_ATTEMPTS, CONNECTION_TIMEOUT).await
    }

    /// Fails with [`Error::Authentication`] or [`Error::Connection`] right away
    /// when the device is not reachable with the given credentials.
    pub async fn with_retry_policy(
        connector: C,
        attempts: u32,
        attempt_timeout: Duration,
    ) -> Result<Self> {
        let client = Self {
            connector,
            attempts: attempts.max(1),
            attempt_timeout,
        };

        let session = client.connect().await?;
        drop(session);

        Ok(client)
    }

    pub fn address(&self) -> &str {
        self.connector.address()
    }

    /// Connects to the device, retrying transport faults.
    ///
    /// A rejected login is returned as [`Error::Authentication`] without retrying.
    pub async fn connect(&self) -> Result<C::Session> {
        let mut attempt = 1;
        loop {
            let result = match timeout(self.attempt_timeout, self.connector.connect()).await {
                Ok(result) => result,
                Err(_) => Err(ShareError::Transport(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no answer within {:?}", self.attempt_timeout),
                ))),
            };

            match result {
                Ok(session) => {
                    if attempt > 1 {
                        info!(
                            address = self.address(),
                            attempt,
                            "connected to IQAir after retrying, check for network problems"
                        );
                    } else {
                        debug!(address = self.address(), "connected to IQAir");
                    }
                    return Ok(session);
                }
                Err(ShareError::Rejected) => {
                    return Err(Error::Authentication {
                        address: self.address().to_string(),
                    });
                }
                Err(ShareError::Transport(e)) if attempt < self.attempts => {
                    warn!(
                        address = self.address(),
                        attempt,
                        error = %e,
                        "can't connect to IQAir, will retry"
                    );
                    attempt += 1;
                }
                Err(ShareError::Transport(e)) => {
                    return Err(Error::Connection {
                        address: self.address().to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads a whole file from the share. `path` is relative to the share root,
    /// e.g. `/<FILENAME>` for files in the root folder.
    pub async fn fetch_document(&self, path: &str) -> Result<Vec<u8>> {
        let mut session = self.connect().await?;
        let mut buffer = Vec::new();

        match session.retrieve_file(path, &mut buffer).await {
            Ok(read) => {
                debug!(read, path, "read file from IQAir");
                Ok(buffer)
            }
            Err(ShareError::FileNotFound(_)) => Err(Error::DocumentNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches and decodes the latest measurements file.
    ///
    /// A missing file and invalid JSON are both reported as
    /// [`Error::MeasurementsUnavailable`].
    pub async fn latest_measurements_document(&self) -> Result<Value> {
        debug!("going to fetch last measurements from IQAir");

        let raw = match self.fetch_document(MEASUREMENTS_FILE_PATH).await {
            Ok(raw) => raw,
            Err(e @ Error::DocumentNotFound { .. }) => return Err(self.unavailable(e)),
            Err(e) => return Err(e),
        };

        let document: Value = serde_json::from_slice(&raw).map_err(|e| self.unavailable(e))?;
        debug!(%document, "fetched IQAir measurements file");

        Ok(document)
    }

    fn unavailable(&self, source: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::MeasurementsUnavailable {
            address: self.address().to_string(),
            source: Box::new(source),
        }
    }
}
