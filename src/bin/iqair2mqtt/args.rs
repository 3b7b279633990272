use chrono_tz::Tz;
use clap::Parser;
use iqair2mqtt::iqair::DEFAULT_SHARE;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "IQAIR_ADDRESS")]
    pub iqair_address: String,

    #[arg(long, env = "IQAIR_LOGIN")]
    pub iqair_login: String,

    #[arg(long, env = "IQAIR_PASSWORD", hide_env_values = true)]
    pub iqair_password: String,

    #[arg(long, env = "IQAIR_SHARE", default_value = DEFAULT_SHARE)]
    pub iqair_share: String,

    /// Time zone the device reports its local date and time in.
    #[arg(long, env = "IQAIR_TIMEZONE", default_value = "America/New_York")]
    pub iqair_timezone: Tz,

    #[arg(long, env = "MQTT_HOST")]
    pub mqtt_host: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    #[arg(long, env = "MQTT_CLIENT_ID", default_value = "iqair2mqtt")]
    pub mqtt_client_id: String,

    #[arg(long, env = "MQTT_LOGIN")]
    pub mqtt_login: String,

    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: String,

    #[arg(long, env = "MQTT_TOPIC")]
    pub mqtt_topic: String,

    #[arg(long, env = "PLACEMENT")]
    pub placement: String,

    #[arg(long, env = "LOCATION")]
    pub location: String,

    /// Seconds to wait between two polls.
    #[arg(long, env = "UPDATE_INTERVAL", default_value_t = 60)]
    pub update_interval: u64,

    #[arg(short, long)]
    pub debug: bool,
}
