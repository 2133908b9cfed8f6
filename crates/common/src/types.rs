use std::{fmt, str::FromStr};

use {
    bytes::Bytes,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::Error;

/// Chat identity of an alert recipient (a Telegram chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub i64);

impl SubscriberId {
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SubscriberId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for SubscriberId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<i64>()
            .map(Self)
            .map_err(|source| Error::InvalidSubscriberId {
                input: trimmed.to_string(),
                source,
            })
    }
}

/// A single delivery from the message bus.
///
/// Created per bus publish and dropped once the pipeline has handled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Build a message stamped with the current time.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

/// The user-facing notification produced for one inbound message.
///
/// Alerts are always fully built before delivery starts; an image alert
/// owns its decoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    Text { body: String },
    Image { bytes: Vec<u8>, caption: String },
}

impl Alert {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn image(bytes: impl Into<Vec<u8>>, caption: impl Into<String>) -> Self {
        Self::Image {
            bytes: bytes.into(),
            caption: caption.into(),
        }
    }

    #[must_use]
    pub fn image_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Image { bytes, .. } => Some(bytes),
            Self::Text { .. } => None,
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { body } => write!(f, "text: {body}"),
            Self::Image { bytes, caption } => {
                write!(f, "image ({} bytes): {caption}", bytes.len())
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_id_parses_negative_group_ids() {
        let id: SubscriberId = " -1001234567890 ".parse().unwrap();
        assert_eq!(id, SubscriberId(-1001234567890));
        assert_eq!(id.to_string(), "-1001234567890");
    }

    #[test]
    fn subscriber_id_rejects_garbage() {
        let err = "not-a-chat".parse::<SubscriberId>().unwrap_err();
        assert!(err.to_string().contains("not-a-chat"));
    }

    #[test]
    fn subscriber_id_serializes_as_plain_integer() {
        let json = serde_json::to_string(&vec![SubscriberId(1), SubscriberId(-2)]).unwrap();
        assert_eq!(json, "[1,-2]");
    }

    #[test]
    fn alert_display_hides_image_bytes() {
        let alert = Alert::image(vec![0xFF, 0xD8, 0x00], "Alert image from topic: cam/front");
        assert_eq!(
            alert.to_string(),
            "image (3 bytes): Alert image from topic: cam/front"
        );
        assert_eq!(alert.kind(), "image");
    }
}
