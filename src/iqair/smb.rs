use std::{
    io::{self, Read},
    sync::{Arc, LazyLock},
};

use async_trait::async_trait;
use pavao::{SmbClient, SmbCredentials, SmbError, SmbOpenOptions, SmbOptions};
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    task,
};

use crate::error::ShareError;
use crate::iqair::{Connector, Session};

/// Share exported by the AirVisual firmware.
pub const DEFAULT_SHARE: &str = "airvisual";

// libsmbclient state is process-wide in pavao: one client may exist at a time.
static CONTEXT_LOCK: LazyLock<Arc<Mutex<()>>> = LazyLock::new(|| Arc::new(Mutex::new(())));

/// A client together with the lock that keeps every other client out until it
/// is dropped.
struct LockedClient {
    client: SmbClient,
    _lock: OwnedMutexGuard<()>,
}

#[derive(Debug, Clone)]
pub struct SmbConnector {
    address: String,
    share: String,
    login: String,
    password: String,
}

impl SmbConnector {
    pub fn new(
        address: impl Into<String>,
        share: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            share: share.into(),
            login: login.into(),
            password: password.into(),
        }
    }

    /// Blocks until no other client is alive, then opens one.
    fn open(&self) -> Result<LockedClient, ShareError> {
        let lock = Arc::clone(&CONTEXT_LOCK).blocking_lock_owned();

        let credentials = SmbCredentials::default()
            .server(format!("smb://{}", self.address))
            .share(format!("/{}", self.share.trim_start_matches('/')))
            .username(&self.login)
            .password(&self.password);

        let client = SmbClient::new(credentials, SmbOptions::default().one_share_per_server(true))
            .map_err(classify_connect_error)?;

        // libsmbclient sets up the session lazily. `stat` forces it and keeps errno.
        client.stat("/").map_err(classify_connect_error)?;

        Ok(LockedClient {
            client,
            _lock: lock,
        })
    }
}

#[async_trait]
impl Connector for SmbConnector {
    type Session = SmbSession;

    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<SmbSession, ShareError> {
        let connector = self.clone();
        // An attempt abandoned by a timeout still finishes here and releases the
        // lock only once its client is dropped.
        let client = task::spawn_blocking(move || connector.open())
            .await
            .map_err(|e| ShareError::Operation(format!("connect task failed: {e}")))??;

        Ok(SmbSession {
            client: Some(client),
        })
    }
}

pub struct SmbSession {
    client: Option<LockedClient>,
}

#[async_trait]
impl Session for SmbSession {
    async fn retrieve_file(
        &mut self,
        path: &str,
        buffer: &mut Vec<u8>,
    ) -> Result<u64, ShareError> {
        let client = self
            .client
            .take()
            .ok_or_else(|| ShareError::Operation("session is closed".to_string()))?;
        let path = path.to_string();

        let (client, result) = task::spawn_blocking(move || {
            let result = read_file(&client.client, &path);
            (client, result)
        })
        .await
        .map_err(|e| ShareError::Operation(format!("read task failed: {e}")))?;
        self.client = Some(client);

        let content = result?;
        buffer.extend_from_slice(&content);
        Ok(content.len() as u64)
    }
}

fn read_file(client: &SmbClient, path: &str) -> Result<Vec<u8>, ShareError> {
    let mut file = client
        .open_with(path, SmbOpenOptions::default().read(true))
        .map_err(|e| match e {
            SmbError::Io(e) if e.kind() == io::ErrorKind::NotFound => {
                ShareError::FileNotFound(path.to_string())
            }
            e => ShareError::Operation(format!("unable to open file '{path}': {e}")),
        })?;

    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .map_err(|e| ShareError::Operation(format!("unable to read file '{path}': {e}")))?;

    Ok(content)
}

fn classify_connect_error(error: SmbError) -> ShareError {
    match error {
        SmbError::Io(e) => match e.kind() {
            io::ErrorKind::PermissionDenied => ShareError::Rejected,
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::NetworkDown
            | io::ErrorKind::BrokenPipe => ShareError::Transport(e),
            _ => ShareError::Operation(e.to_string()),
        },
        e => ShareError::Operation(e.to_string()),
    }
}
