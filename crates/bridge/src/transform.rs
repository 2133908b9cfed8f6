use std::fmt::Write as _;

use {
    base64::{
        Engine as _, alphabet,
        engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    },
    mqttgram_common::Alert,
    mqttgram_config::ClassifierConfig,
};

use crate::{
    classifier::{ContentDecision, DATA_URI_MARKER, find_base64_marker},
    error::DecodeError,
};

/// Standard alphabet, padding optional. Cameras are inconsistent about it.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Turns classified payloads into alerts. Pure: no I/O.
#[derive(Debug, Clone)]
pub struct PayloadTransformer {
    hex_preview_len: usize,
}

impl PayloadTransformer {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            hex_preview_len: config.hex_preview_len,
        }
    }

    pub fn transform(
        &self,
        decision: ContentDecision,
        topic: &str,
        payload: &[u8],
    ) -> Result<Alert, DecodeError> {
        match decision {
            ContentDecision::Text => {
                let text =
                    std::str::from_utf8(payload).map_err(|e| DecodeError::Text(e.to_string()))?;
                Ok(Alert::text(format!("Alert from {topic}: {text}")))
            },
            ContentDecision::ImageBinary => Ok(Alert::image(payload, image_caption(topic))),
            ContentDecision::ImageBase64 => {
                let bytes = decode_base64_image(payload)?;
                Ok(Alert::image(bytes, image_caption(topic)))
            },
            ContentDecision::UnknownBinary => Ok(Alert::text(format!(
                "Alert from {topic}: [undisplayable binary payload, {} bytes] {}",
                payload.len(),
                hex_preview(payload, self.hex_preview_len)
            ))),
        }
    }
}

pub(crate) fn image_caption(topic: &str) -> String {
    format!("Alert image from topic: {topic}")
}

/// Space separated hex of the first `limit` bytes, with a trailing `…` when
/// the payload is longer.
pub fn hex_preview(payload: &[u8], limit: usize) -> String {
    let shown = &payload[..payload.len().min(limit)];
    let mut out = String::with_capacity(shown.len() * 3 + 2);
    for (i, byte) in shown.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    if payload.len() > shown.len() {
        out.push_str(" …");
    }
    out
}

/// Extract and decode the base64 image embedded in `payload`.
///
/// A `data:image/...;base64,` URI is decoded from after its comma, a bare
/// JPEG/PNG base64 run from its marker. The run ends at a closing quote or
/// at the end of the payload, so a value wrapped in JSON still decodes.
/// Whitespace inside the run is ignored; any other byte outside the base64
/// alphabet is an error.
fn decode_base64_image(payload: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let start = match find_base64_marker(payload, payload.len()) {
        Some((pos, DATA_URI_MARKER)) => {
            let rest = &payload[pos..];
            let comma = rest
                .iter()
                .position(|b| *b == b',')
                .ok_or(DecodeError::MalformedDataUri)?;
            pos + comma + 1
        },
        Some((pos, _)) => pos,
        None => 0,
    };

    let run = &payload[start..];
    let end = run
        .iter()
        .position(|b| matches!(b, b'"' | b'\''))
        .unwrap_or(run.len());

    let mut encoded = Vec::with_capacity(end);
    for (offset, &b) in run[..end].iter().enumerate() {
        if b.is_ascii_whitespace() {
            continue;
        }
        if !is_base64_byte(b) {
            return Err(DecodeError::Base64(format!(
                "invalid byte 0x{b:02x} at offset {}",
                start + offset
            )));
        }
        encoded.push(b);
    }
    if encoded.is_empty() {
        return Err(DecodeError::MissingImageData);
    }

    let bytes = BASE64
        .decode(&encoded)
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    if bytes.is_empty() {
        return Err(DecodeError::MissingImageData);
    }
    Ok(bytes)
}

fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')
}
