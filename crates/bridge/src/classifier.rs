//! Content sniffing for payloads of unknown shape.
//!
//! Rules, first match wins:
//!
//! 1. empty payload: [`ContentDecision::UnknownBinary`] (the pipeline drops it)
//! 2. topic in the configured image topics: base64 image if a marker is
//!    present in the sniff window, raw image otherwise
//! 3. `data:image`, `/9j/` (JPEG) or `iVBOR` (PNG) in the sniff window:
//!    [`ContentDecision::ImageBase64`]
//! 4. JPEG signature `FF D8` at the start: [`ContentDecision::ImageBinary`]
//! 5. valid UTF-8: [`ContentDecision::Text`]
//! 6. larger than the binary threshold: [`ContentDecision::ImageBinary`],
//!    since many cameras publish headerless frames; otherwise
//!    [`ContentDecision::UnknownBinary`]

use std::fmt;

use mqttgram_config::ClassifierConfig;

use crate::topic::topic_matches;

/// First two bytes of every JPEG file.
pub const JPEG_SIGNATURE: [u8; 2] = [0xFF, 0xD8];

/// Byte patterns that mark base64-encoded image data.
pub const BASE64_IMAGE_MARKERS: [&[u8]; 3] = [DATA_URI_MARKER, b"/9j/", b"iVBOR"];

pub(crate) const DATA_URI_MARKER: &[u8] = b"data:image";

/// What an inbound payload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentDecision {
    Text,
    ImageBinary,
    ImageBase64,
    UnknownBinary,
}

impl ContentDecision {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::ImageBinary => "image_binary",
            Self::ImageBase64 => "image_base64",
            Self::UnknownBinary => "unknown_binary",
        }
    }

    #[must_use]
    pub fn is_image(self) -> bool {
        matches!(self, Self::ImageBinary | Self::ImageBase64)
    }
}

impl fmt::Display for ContentDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PayloadClassifier {
    image_topics: Vec<String>,
    sniff_len: usize,
    large_binary_threshold: usize,
}

impl PayloadClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            image_topics: config.image_topics.clone(),
            sniff_len: config.sniff_len,
            large_binary_threshold: config.large_binary_threshold,
        }
    }

    pub fn classify(&self, topic: &str, payload: &[u8]) -> ContentDecision {
        if payload.is_empty() {
            return ContentDecision::UnknownBinary;
        }

        let has_marker = find_base64_marker(payload, self.sniff_len).is_some();

        if self.is_image_topic(topic) {
            return if has_marker {
                ContentDecision::ImageBase64
            } else {
                ContentDecision::ImageBinary
            };
        }
        if has_marker {
            return ContentDecision::ImageBase64;
        }
        if payload.starts_with(&JPEG_SIGNATURE) {
            return ContentDecision::ImageBinary;
        }
        if std::str::from_utf8(payload).is_ok() {
            return ContentDecision::Text;
        }
        if payload.len() > self.large_binary_threshold {
            ContentDecision::ImageBinary
        } else {
            ContentDecision::UnknownBinary
        }
    }

    pub fn is_image_topic(&self, topic: &str) -> bool {
        self.image_topics
            .iter()
            .any(|filter| topic_matches(filter, topic))
    }
}

/// Locate the earliest base64 image marker that starts within the first
/// `sniff_len` bytes and fits entirely inside them.
///
/// Returns the marker's offset and the marker itself.
pub(crate) fn find_base64_marker(payload: &[u8], sniff_len: usize) -> Option<(usize, &'static [u8])> {
    let window = &payload[..payload.len().min(sniff_len)];
    BASE64_IMAGE_MARKERS
        .iter()
        .filter_map(|marker| {
            window
                .windows(marker.len())
                .position(|w| w == *marker)
                .map(|pos| (pos, *marker))
        })
        .min_by_key(|(pos, _)| *pos)
}
