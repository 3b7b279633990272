mod args;

use std::{process::ExitCode, time::Duration};

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use iqair2mqtt::{
    iqair::{DeviceClient, DeviceMetadata, SmbConnector},
    mqtt::{MqttPublisher, MqttSettings},
    poll::PollLoop,
};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = run().await {
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("iqair2mqtt={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let connector = SmbConnector::new(
        &args.iqair_address,
        &args.iqair_share,
        &args.iqair_login,
        &args.iqair_password,
    );
    let device = DeviceClient::new(connector)
        .await
        .context("can't connect to IQAir, check config")?;

    let publisher = MqttPublisher::connect(MqttSettings {
        host: args.mqtt_host,
        port: args.mqtt_port,
        client_id: args.mqtt_client_id,
        login: args.mqtt_login,
        password: args.mqtt_password,
        topic: args.mqtt_topic,
    });

    let metadata = DeviceMetadata {
        placement: args.placement,
        location: args.location,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::warn!(error = %e, "can't listen for shutdown signal");
                // Dropping the sender would stop the loop.
                std::future::pending::<()>().await;
            }
        }
    });

    PollLoop::new(
        device,
        publisher,
        metadata,
        args.iqair_timezone,
        Duration::from_secs(args.update_interval),
    )
    .run(shutdown_rx)
    .await
    .context("IQAir polling stopped")
}
