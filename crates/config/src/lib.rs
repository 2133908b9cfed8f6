//! Configuration loading, environment overrides, and validation.
//!
//! Config files: `mqttgram.toml`, `mqttgram.yaml`, or `mqttgram.json`,
//! searched in `./` then `~/.config/mqttgram/`. Environment variables
//! (`MQTT_BROKER`, `TELEGRAM_BOT_TOKEN`, ...) override file values.

pub mod env;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    env::{apply_env_overrides, apply_env_overrides_with},
    error::{Error, Result},
    loader::{config_dir, data_dir, discover_config_file, load, load_config},
    schema::{
        BackoffConfig, BridgeConfig, ClassifierConfig, DispatchConfig, MetricsConfig, MqttConfig,
        SubscribersConfig, TelegramConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
