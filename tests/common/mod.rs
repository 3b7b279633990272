use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use iqair2mqtt::iqair::{Connector, MEASUREMENTS_FILE_PATH, Session};
use iqair2mqtt::mqtt::Publisher;
use iqair2mqtt::{Error, ShareError};
use serde_json::{Value, json};

/// What the fake device answers on one connection.
#[derive(Debug, Clone)]
pub enum Reply {
    Document(Value),
    Raw(&'static str),
    Missing,
    Refused,
    Rejected,
}

/// A file share serving the measurements file from a queue. Once the queue is
/// empty every connection is refused.
#[derive(Clone, Default)]
pub struct FakeDevice {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeDevice {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            ..Default::default()
        }
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeSession {
    reply: Reply,
    closed: Arc<AtomicUsize>,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeDevice {
    type Session = FakeSession;

    fn address(&self) -> &str {
        "192.168.1.20"
    }

    async fn connect(&self) -> Result<FakeSession, ShareError> {
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Refused);
        match reply {
            Reply::Refused => Err(ShareError::Transport(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            ))),
            Reply::Rejected => Err(ShareError::Rejected),
            reply => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                Ok(FakeSession {
                    reply,
                    closed: Arc::clone(&self.closed),
                })
            }
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn retrieve_file(
        &mut self,
        path: &str,
        buffer: &mut Vec<u8>,
    ) -> Result<u64, ShareError> {
        assert_eq!(path, MEASUREMENTS_FILE_PATH);

        let content = match &self.reply {
            Reply::Document(document) => document.to_string(),
            Reply::Raw(raw) => raw.to_string(),
            _ => return Err(ShareError::FileNotFound(path.to_string())),
        };
        buffer.extend_from_slice(content.as_bytes());
        Ok(content.len() as u64)
    }
}

#[derive(Clone, Default)]
pub struct RecordingPublisher {
    pub payloads: Arc<Mutex<Vec<Value>>>,
    pub fail_next: Arc<AtomicUsize>,
}

impl RecordingPublisher {
    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, payload: String) -> Result<(), Error> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::BrokerNotConnected);
        }

        let payload = serde_json::from_str(&payload).unwrap();
        self.payloads.lock().unwrap().push(payload);
        Ok(())
    }
}

pub fn document(timestamp: &str) -> Value {
    json!({
        "settings": {"node_name": "t", "is_indoor": true},
        "measurements": {"co2_ppm": "429"},
        "date_and_time": {"timestamp": timestamp}
    })
}
