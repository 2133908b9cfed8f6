//! Startup validation.
//!
//! Errors abort startup; warnings are logged and the bridge keeps going.

use crate::schema::BridgeConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted config path, e.g. "mqtt.port"
    pub path: &'static str,
    /// Environment variable that sets the value.
    pub env: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({}): {}",
            self.severity, self.path, self.env, self.message
        )
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Error diagnostics joined into one message.
    #[must_use]
    pub fn error_summary(&self) -> String {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn push(
        &mut self,
        severity: Severity,
        path: &'static str,
        env: &'static str,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            env,
            message: message.into(),
        });
    }
}

/// Check a loaded configuration for values the bridge cannot run with.
#[must_use]
pub fn validate(config: &BridgeConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if !config.telegram.has_token() {
        result.push(
            Severity::Error,
            "telegram.token",
            "TELEGRAM_BOT_TOKEN",
            "a Telegram bot token is required",
        );
    }
    if config.mqtt.broker.trim().is_empty() {
        result.push(
            Severity::Error,
            "mqtt.broker",
            "MQTT_BROKER",
            "broker host must not be empty",
        );
    }
    if config.mqtt.port == 0 {
        result.push(Severity::Error, "mqtt.port", "MQTT_PORT", "port must be non-zero");
    }
    if config.mqtt.topic.trim().is_empty() {
        result.push(
            Severity::Error,
            "mqtt.topic",
            "MQTT_TOPIC",
            "topic pattern must not be empty",
        );
    }
    if config.mqtt.qos > 2 {
        result.push(
            Severity::Error,
            "mqtt.qos",
            "MQTT_QOS",
            format!("QoS must be 0, 1 or 2 (got {})", config.mqtt.qos),
        );
    }
    if config.mqtt.max_packet_bytes < 1024 {
        result.push(
            Severity::Error,
            "mqtt.max_packet_bytes",
            "MQTT_MAX_PACKET_BYTES",
            "packet size limit must be at least 1024 bytes",
        );
    }
    if config.dispatch.timeout_secs == 0 {
        result.push(
            Severity::Error,
            "dispatch.timeout_secs",
            "DISPATCH_TIMEOUT_SECS",
            "delivery timeout must be at least one second",
        );
    }
    if config.dispatch.max_concurrent == 0 {
        result.push(
            Severity::Error,
            "dispatch.max_concurrent",
            "DISPATCH_MAX_CONCURRENT",
            "at least one delivery must be allowed at a time",
        );
    }

    let backoff = &config.backoff;
    if backoff.initial_ms == 0 {
        result.push(
            Severity::Error,
            "backoff.initial_ms",
            "BACKOFF_INITIAL_MS",
            "initial backoff must be non-zero",
        );
    }
    if backoff.max_ms < backoff.initial_ms {
        result.push(
            Severity::Error,
            "backoff.max_ms",
            "BACKOFF_MAX_MS",
            format!(
                "max backoff {}ms is below initial backoff {}ms",
                backoff.max_ms, backoff.initial_ms
            ),
        );
    }
    if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
        result.push(
            Severity::Error,
            "backoff.multiplier",
            "BACKOFF_MULTIPLIER",
            "multiplier must be a finite number >= 1",
        );
    }

    if config.telegram.admin_chat_id.is_none() && config.telegram.allowlist.is_empty() {
        result.push(
            Severity::Warning,
            "telegram.admin_chat_id",
            "TELEGRAM_ADMIN_ID",
            "no admin chat and an empty allowlist: any Telegram user can subscribe",
        );
    }
    if config.classifier.hex_preview_len == 0 {
        result.push(
            Severity::Warning,
            "classifier.hex_preview_len",
            "HEX_PREVIEW_LEN",
            "binary previews will be empty",
        );
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn valid() -> BridgeConfig {
        let mut cfg = BridgeConfig::default();
        cfg.telegram.token = Secret::new("123:ABC".into());
        cfg.telegram.admin_chat_id = Some(1);
        cfg
    }

    #[test]
    fn valid_config_has_no_diagnostics() {
        let result = validate(&valid());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn missing_token_is_fatal() {
        let mut cfg = valid();
        cfg.telegram.token = Secret::new("   ".into());
        let result = validate(&cfg);
        assert!(result.has_errors());
        assert!(result.error_summary().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn backoff_bounds_are_checked() {
        let mut cfg = valid();
        cfg.backoff.initial_ms = 1000;
        cfg.backoff.max_ms = 10;
        cfg.backoff.multiplier = 0.5;
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Error), 2);
    }

    #[test]
    fn zero_delivery_concurrency_is_fatal() {
        let mut cfg = valid();
        cfg.dispatch.max_concurrent = 0;
        let result = validate(&cfg);
        assert!(result.error_summary().contains("DISPATCH_MAX_CONCURRENT"));
    }

    #[test]
    fn open_bot_is_only_a_warning() {
        let mut cfg = valid();
        cfg.telegram.admin_chat_id = None;
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }
}
