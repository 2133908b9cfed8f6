//! Config schema for the bridge: bus connection, Telegram bot, payload
//! classification thresholds, delivery, and reconnect backoff.
use std::{net::SocketAddr, path::PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    pub telegram: TelegramConfig,
    pub classifier: ClassifierConfig,
    pub dispatch: DispatchConfig,
    pub backoff: BackoffConfig,
    pub subscribers: SubscribersConfig,
    pub metrics: MetricsConfig,
    /// How long shutdown waits for in-flight work before abandoning it.
    pub shutdown_grace_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            telegram: TelegramConfig::default(),
            classifier: ClassifierConfig::default(),
            dispatch: DispatchConfig::default(),
            backoff: BackoffConfig::default(),
            subscribers: SubscribersConfig::default(),
            metrics: MetricsConfig::default(),
            shutdown_grace_secs: 5,
        }
    }
}

/// MQTT broker connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    /// Subscription filter, may contain `+` and `#` wildcards.
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Subscription and last-will QoS (0, 1 or 2).
    pub qos: u8,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_secs: u64,
    /// Retained message the broker publishes if the bridge drops off.
    /// `None` disables the last will.
    pub last_will: Option<String>,
    /// Largest incoming packet accepted from the broker (bytes).
    pub max_packet_bytes: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "mqtt".into(),
            port: 1883,
            topic: "agentdvr/#".into(),
            client_id: "mqttgram".into(),
            keep_alive_secs: 60,
            qos: 2,
            username: None,
            password: None,
            connect_timeout_secs: 10,
            last_will: Some("Bot disconnected unexpectedly!".into()),
            max_packet_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Telegram bot account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Chat that is always allowed and is subscribed on first start.
    pub admin_chat_id: Option<i64>,

    /// Chat ids or usernames allowed to subscribe. Empty means open.
    pub allowlist: Vec<String>,

    /// Long-polling timeout for getUpdates (seconds).
    pub poll_timeout_secs: u32,
}

impl TelegramConfig {
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("admin_chat_id", &self.admin_chat_id)
            .field("allowlist", &self.allowlist)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            admin_chat_id: None,
            allowlist: Vec::new(),
            poll_timeout_secs: 30,
        }
    }
}

/// Content sniffing thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Topic filters whose payloads are always images (`+`/`#` allowed).
    pub image_topics: Vec<String>,
    /// How many leading bytes are searched for base64 image markers.
    pub sniff_len: usize,
    /// Undecodable payloads larger than this are sent as images.
    pub large_binary_threshold: usize,
    /// Bytes shown in the hex preview of small binary payloads.
    pub hex_preview_len: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            image_topics: Vec::new(),
            sniff_len: 20,
            large_binary_threshold: 100,
            hex_preview_len: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-recipient delivery timeout.
    pub timeout_secs: u64,
    /// Recipients contacted at once for one alert.
    pub max_concurrent: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_concurrent: 8,
        }
    }
}

/// Reconnect backoff for the bus connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubscribersConfig {
    /// Subscriber list file. Defaults to `<data dir>/subscribers.json`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Serve Prometheus `/metrics` on this address.
    pub listen: Option<SocketAddr>,
}
