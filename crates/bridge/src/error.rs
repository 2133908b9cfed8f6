/// The bus could not be reached or refused the session.
///
/// Always retried by the controller with backoff; never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectivityError {
    #[error("network connection failed: {0}")]
    Network(String),

    #[error("broker rejected connection: {0}")]
    Rejected(String),

    #[error("connection timed out after {timeout_millis}ms")]
    Timeout { timeout_millis: u64 },

    #[error("subscribe to {pattern:?} failed: {reason}")]
    Subscribe { pattern: String, reason: String },
}

/// A payload could not be decoded as its content decision claimed.
///
/// Recovered by the pipeline, which falls back to [`DecodeError::fallback`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64 image data: {0}")]
    Base64(String),

    #[error("data URI has no ',' before its payload")]
    MalformedDataUri,

    #[error("no base64 image data found")]
    MissingImageData,

    #[error("payload is not valid UTF-8 text: {0}")]
    Text(String),
}

impl DecodeError {
    /// How the payload is handled when decoding fails.
    ///
    /// Image data is forwarded as raw bytes; text falls back to a binary
    /// preview.
    #[must_use]
    pub fn fallback(&self) -> crate::classifier::ContentDecision {
        use crate::classifier::ContentDecision;
        match self {
            Self::Text(_) => ContentDecision::UnknownBinary,
            Self::Base64(_) | Self::MalformedDataUri | Self::MissingImageData => {
                ContentDecision::ImageBinary
            },
        }
    }
}
