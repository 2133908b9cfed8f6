use std::time::Duration;

use {
    async_trait::async_trait,
    mqttgram_common::{Alert, SubscriberId},
};

/// Why a single delivery to a single recipient failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The chat API could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The chat API refused the request (4xx, blocked bot, bad chat id).
    #[error("rejected by chat API: {0}")]
    Rejected(String),

    /// The chat API failed on its side (5xx).
    #[error("chat API server error: {0}")]
    Server(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl DeliveryError {
    /// Classify an HTTP status returned by the chat API.
    #[must_use]
    pub fn from_status(status: u16, description: impl Into<String>) -> Self {
        let description = description.into();
        match status {
            429 => Self::RateLimited {
                retry_after_secs: 0,
            },
            500..=599 => Self::Server(format!("{status}: {description}")),
            400..=499 => Self::Rejected(format!("{status}: {description}")),
            _ => Self::Other(format!("{status}: {description}")),
        }
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Rejected(_) => "rejected",
            Self::Server(_) => "server",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout(_) => "timeout",
            Self::Other(_) => "other",
        }
    }
}

/// Send alerts to a chat platform.
///
/// Each call is one delivery attempt to one recipient; implementations must
/// not retry.
#[async_trait]
pub trait AlertOutbound: Send + Sync {
    async fn send_text(&self, to: SubscriberId, body: &str) -> Result<(), DeliveryError>;

    async fn send_image(
        &self,
        to: SubscriberId,
        bytes: &[u8],
        caption: &str,
    ) -> Result<(), DeliveryError>;

    /// Deliver one alert, picking the call that matches its kind.
    async fn deliver(&self, to: SubscriberId, alert: &Alert) -> Result<(), DeliveryError> {
        match alert {
            Alert::Text { body } => self.send_text(to, body).await,
            Alert::Image { bytes, caption } => self.send_image(to, bytes, caption).await,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(400, "rejected")]
    #[case(403, "rejected")]
    #[case(429, "rate_limited")]
    #[case(500, "server")]
    #[case(502, "server")]
    #[case(302, "other")]
    fn status_classification(#[case] status: u16, #[case] reason: &str) {
        assert_eq!(DeliveryError::from_status(status, "boom").reason(), reason);
    }

    #[test]
    fn rejected_message_keeps_description() {
        let err = DeliveryError::from_status(403, "Forbidden: bot was blocked by the user");
        assert_eq!(
            err.to_string(),
            "rejected by chat API: 403: Forbidden: bot was blocked by the user"
        );
    }
}
