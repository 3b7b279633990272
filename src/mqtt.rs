use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const KEEP_ALIVE: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Destination for serialized measurement batches.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, payload: String) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub login: String,
    pub password: String,
    pub topic: String,
}

pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
    connected: Arc<AtomicBool>,
    event_loop: JoinHandle<()>,
}

impl MqttPublisher {
    /// Starts the client. The connection is made in the background; `publish`
    /// fails with [`Error::BrokerNotConnected`] until the broker acknowledges it.
    pub fn connect(settings: MqttSettings) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_credentials(&settings.login, &settings.password);

        let (client, event_loop) = AsyncClient::new(options, 10);
        let connected = Arc::new(AtomicBool::new(false));

        debug!(host = %settings.host, "starting MQTT client loop");
        let event_loop = tokio::spawn(drive(event_loop, settings.host, Arc::clone(&connected)));

        Self {
            client,
            topic: settings.topic,
            connected,
            event_loop,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, payload: String) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::BrokerNotConnected);
        }

        self.client
            .publish(&self.topic, QoS::ExactlyOnce, false, payload)
            .await?;

        Ok(())
    }
}

async fn drive(mut event_loop: EventLoop, host: String, connected: Arc<AtomicBool>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!(host = %host, "connected to MQTT broker");
                    connected.store(true, Ordering::SeqCst);
                } else {
                    warn!(host = %host, code = ?ack.code, "MQTT broker refused the connection");
                    connected.store(false, Ordering::SeqCst);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                info!(host = %host, "disconnected from MQTT broker");
                connected.store(false, Ordering::SeqCst);
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    info!(host = %host, error = %e, "disconnected from MQTT broker");
                } else {
                    warn!(host = %host, error = %e, "can't connect to MQTT broker");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
