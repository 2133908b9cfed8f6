//! Metric name and label definitions.
//!
//! Every metric mqttgram records is named here so the exported set is easy
//! to audit.

/// Bus-side bridge metrics
pub mod bridge {
    /// Messages received from the bus
    pub const MESSAGES_RECEIVED_TOTAL: &str = "mqttgram_bridge_messages_received_total";
    /// Messages dropped without an alert (empty payloads)
    pub const MESSAGES_DROPPED_TOTAL: &str = "mqttgram_bridge_messages_dropped_total";
    /// Content decisions, labelled by `decision`
    pub const DECISIONS_TOTAL: &str = "mqttgram_bridge_decisions_total";
    /// Base64 payloads that failed to decode and were sent as raw bytes
    pub const DECODE_FALLBACKS_TOTAL: &str = "mqttgram_bridge_decode_fallbacks_total";
    /// Bus connection attempts
    pub const CONNECT_ATTEMPTS_TOTAL: &str = "mqttgram_bridge_connect_attempts_total";
    /// Failed bus connection attempts
    pub const CONNECT_FAILURES_TOTAL: &str = "mqttgram_bridge_connect_failures_total";
    /// Bus disconnects observed while subscribed
    pub const DISCONNECTS_TOTAL: &str = "mqttgram_bridge_disconnects_total";
    /// Current controller state (0 = disconnected, 1 = connecting, 2 = subscribed)
    pub const STATE: &str = "mqttgram_bridge_state";
    /// Time spent handling one inbound message, in seconds
    pub const MESSAGE_DURATION_SECONDS: &str = "mqttgram_bridge_message_duration_seconds";
}

/// Alert fan-out metrics
pub mod dispatch {
    /// Alerts handed to the dispatcher, labelled by `kind`
    pub const ALERTS_TOTAL: &str = "mqttgram_dispatch_alerts_total";
    /// Alerts dropped because nobody is subscribed
    pub const NO_SUBSCRIBERS_TOTAL: &str = "mqttgram_dispatch_no_subscribers_total";
    /// Successful per-recipient deliveries
    pub const DELIVERIES_SUCCEEDED_TOTAL: &str = "mqttgram_dispatch_deliveries_succeeded_total";
    /// Failed per-recipient deliveries, labelled by `reason`
    pub const DELIVERIES_FAILED_TOTAL: &str = "mqttgram_dispatch_deliveries_failed_total";
    /// Per-recipient delivery duration in seconds
    pub const DELIVERY_DURATION_SECONDS: &str = "mqttgram_dispatch_delivery_duration_seconds";
}

/// Subscriber registry metrics
pub mod subscribers {
    /// Number of registered subscribers
    pub const ACTIVE: &str = "mqttgram_subscribers_active";
    /// Registry mutations, labelled by `op` (add, remove)
    pub const CHANGES_TOTAL: &str = "mqttgram_subscribers_changes_total";
    /// Failed writes of the subscriber list
    pub const PERSIST_ERRORS_TOTAL: &str = "mqttgram_subscribers_persist_errors_total";
}

/// Telegram control-plane metrics
pub mod telegram {
    /// Updates received from Telegram
    pub const UPDATES_RECEIVED_TOTAL: &str = "mqttgram_telegram_updates_received_total";
    /// Bot commands handled, labelled by `command`
    pub const COMMANDS_TOTAL: &str = "mqttgram_telegram_commands_total";
    /// Commands refused by the allow-list
    pub const ACCESS_DENIALS_TOTAL: &str = "mqttgram_telegram_access_denials_total";
    /// Failed getUpdates polls
    pub const POLLING_ERRORS_TOTAL: &str = "mqttgram_telegram_polling_errors_total";
    /// Photos re-sent as documents after Telegram refused them
    pub const PHOTO_DOCUMENT_FALLBACKS_TOTAL: &str =
        "mqttgram_telegram_photo_document_fallbacks_total";
}

/// Histogram bucket boundaries
pub mod buckets {
    /// Chat API delivery duration buckets (in seconds)
    /// Covers 10ms to 60s
    pub const DELIVERY_DURATION: &[f64] = &[
        0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];

    /// Whole-message handling buckets (in seconds)
    pub const MESSAGE_DURATION: &[f64] = &[
        0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 30.0, 60.0,
    ];
}
