//! Environment variable overrides.
//!
//! Each variable replaces the matching config value when set. List values
//! (`IMAGE_TOPICS`, `TELEGRAM_ALLOWLIST`) are comma separated.

use std::{path::PathBuf, str::FromStr};

use secrecy::Secret;

use crate::{
    error::{Error, Result},
    schema::BridgeConfig,
};

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut BridgeConfig) -> Result<()> {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

/// Apply overrides using a custom lookup function.
///
/// Split out from [`apply_env_overrides`] so it can be tested without
/// mutating the process environment. Empty values are treated as unset.
pub fn apply_env_overrides_with(
    config: &mut BridgeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("MQTT_BROKER") {
        config.mqtt.broker = v;
    }
    if let Some(v) = get("MQTT_PORT") {
        config.mqtt.port = parse("MQTT_PORT", &v)?;
    }
    if let Some(v) = get("MQTT_TOPIC") {
        config.mqtt.topic = v;
    }
    if let Some(v) = get("MQTT_CLIENT_ID") {
        config.mqtt.client_id = v;
    }
    if let Some(v) = get("MQTT_KEEP_ALIVE_SECS") {
        config.mqtt.keep_alive_secs = parse("MQTT_KEEP_ALIVE_SECS", &v)?;
    }
    if let Some(v) = get("MQTT_QOS") {
        config.mqtt.qos = parse("MQTT_QOS", &v)?;
    }
    if let Some(v) = get("MQTT_USERNAME") {
        config.mqtt.username = Some(v);
    }
    if let Some(v) = get("MQTT_PASSWORD") {
        config.mqtt.password = Some(v);
    }
    if let Some(v) = get("MQTT_CONNECT_TIMEOUT_SECS") {
        config.mqtt.connect_timeout_secs = parse("MQTT_CONNECT_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = get("MQTT_LAST_WILL") {
        config.mqtt.last_will = Some(v);
    }
    if let Some(v) = get("MQTT_MAX_PACKET_BYTES") {
        config.mqtt.max_packet_bytes = parse("MQTT_MAX_PACKET_BYTES", &v)?;
    }

    if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
        config.telegram.token = Secret::new(v.trim().to_string());
    }
    if let Some(v) = get("TELEGRAM_ADMIN_ID") {
        config.telegram.admin_chat_id = Some(parse("TELEGRAM_ADMIN_ID", &v)?);
    }
    if let Some(v) = get("TELEGRAM_ALLOWLIST") {
        config.telegram.allowlist = split_list(&v);
    }
    if let Some(v) = get("TELEGRAM_POLL_TIMEOUT_SECS") {
        config.telegram.poll_timeout_secs = parse("TELEGRAM_POLL_TIMEOUT_SECS", &v)?;
    }

    if let Some(v) = get("IMAGE_TOPICS") {
        config.classifier.image_topics = split_list(&v);
    }
    if let Some(v) = get("SNIFF_LEN") {
        config.classifier.sniff_len = parse("SNIFF_LEN", &v)?;
    }
    if let Some(v) = get("LARGE_BINARY_THRESHOLD") {
        config.classifier.large_binary_threshold = parse("LARGE_BINARY_THRESHOLD", &v)?;
    }
    if let Some(v) = get("HEX_PREVIEW_LEN") {
        config.classifier.hex_preview_len = parse("HEX_PREVIEW_LEN", &v)?;
    }

    if let Some(v) = get("DISPATCH_TIMEOUT_SECS") {
        config.dispatch.timeout_secs = parse("DISPATCH_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = get("DISPATCH_MAX_CONCURRENT") {
        config.dispatch.max_concurrent = parse("DISPATCH_MAX_CONCURRENT", &v)?;
    }
    if let Some(v) = get("BACKOFF_INITIAL_MS") {
        config.backoff.initial_ms = parse("BACKOFF_INITIAL_MS", &v)?;
    }
    if let Some(v) = get("BACKOFF_MAX_MS") {
        config.backoff.max_ms = parse("BACKOFF_MAX_MS", &v)?;
    }
    if let Some(v) = get("BACKOFF_MULTIPLIER") {
        config.backoff.multiplier = parse("BACKOFF_MULTIPLIER", &v)?;
    }

    if let Some(v) = get("SUBSCRIBERS_FILE") {
        config.subscribers.path = Some(PathBuf::from(v));
    }
    if let Some(v) = get("SHUTDOWN_GRACE_SECS") {
        config.shutdown_grace_secs = parse("SHUTDOWN_GRACE_SECS", &v)?;
    }
    if let Some(v) = get("METRICS_ENABLED") {
        config.metrics.enabled = parse_bool("METRICS_ENABLED", &v)?;
    }
    if let Some(v) = get("METRICS_LISTEN") {
        config.metrics.listen = Some(parse("METRICS_LISTEN", &v)?);
    }

    Ok(())
}

fn parse<T>(var: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| Error::invalid_env(var, value, e))
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::invalid_env(var, value, "expected a boolean")),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::collections::HashMap};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn overrides_connection_and_credentials() {
        let mut cfg = BridgeConfig::default();
        apply_env_overrides_with(
            &mut cfg,
            lookup(&[
                ("MQTT_BROKER", "broker.local"),
                ("MQTT_PORT", "8883"),
                ("MQTT_TOPIC", "cams/#"),
                ("TELEGRAM_BOT_TOKEN", " 123:ABC \n"),
                ("TELEGRAM_ADMIN_ID", "-100200"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.mqtt.broker, "broker.local");
        assert_eq!(cfg.mqtt.port, 8883);
        assert_eq!(cfg.mqtt.topic, "cams/#");
        assert_eq!(cfg.telegram.token.expose_secret(), "123:ABC");
        assert_eq!(cfg.telegram.admin_chat_id, Some(-100200));
    }

    #[test]
    fn list_values_are_comma_separated() {
        let mut cfg = BridgeConfig::default();
        apply_env_overrides_with(
            &mut cfg,
            lookup(&[
                ("IMAGE_TOPICS", "cam/front, cam/+/snap ,,"),
                ("TELEGRAM_ALLOWLIST", "42,@alice"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.classifier.image_topics, vec!["cam/front", "cam/+/snap"]);
        assert_eq!(cfg.telegram.allowlist, vec!["42", "@alice"]);
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut cfg = BridgeConfig::default();
        apply_env_overrides_with(&mut cfg, lookup(&[("MQTT_BROKER", "  ")])).unwrap();
        assert_eq!(cfg.mqtt.broker, "mqtt");
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let mut cfg = BridgeConfig::default();
        let err = apply_env_overrides_with(&mut cfg, lookup(&[("MQTT_PORT", "eighty")]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("MQTT_PORT"), "{msg}");
        assert!(msg.contains("eighty"), "{msg}");
    }

    #[test]
    fn thresholds_and_backoff() {
        let mut cfg = BridgeConfig::default();
        apply_env_overrides_with(
            &mut cfg,
            lookup(&[
                ("LARGE_BINARY_THRESHOLD", "512"),
                ("HEX_PREVIEW_LEN", "8"),
                ("BACKOFF_MULTIPLIER", "1.5"),
                ("DISPATCH_TIMEOUT_SECS", "3"),
                ("DISPATCH_MAX_CONCURRENT", "2"),
                ("METRICS_ENABLED", "yes"),
                ("METRICS_LISTEN", "127.0.0.1:9100"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.classifier.large_binary_threshold, 512);
        assert_eq!(cfg.classifier.hex_preview_len, 8);
        assert!((cfg.backoff.multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(cfg.dispatch.timeout_secs, 3);
        assert_eq!(cfg.dispatch.max_concurrent, 2);
        assert!(cfg.metrics.enabled);
        assert_eq!(
            cfg.metrics.listen.map(|a| a.port()),
            Some(9100)
        );
    }
}
