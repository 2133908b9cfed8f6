use {
    mqttgram_common::{Alert, InboundMessage},
    mqttgram_config::ClassifierConfig,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use mqttgram_metrics::{bridge as bridge_metrics, counter};

use crate::{
    classifier::{ContentDecision, PayloadClassifier},
    error::DecodeError,
    transform::{PayloadTransformer, image_caption},
};

/// An alert built from one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAlert {
    /// What the classifier decided.
    pub decision: ContentDecision,
    pub alert: Alert,
    /// Set when decoding as `decision` failed and the alert was built from
    /// the fallback instead.
    pub fallback: Option<DecodeError>,
}

/// Classifier followed by transformer.
#[derive(Debug, Clone)]
pub struct Pipeline {
    classifier: PayloadClassifier,
    transformer: PayloadTransformer,
}

impl Pipeline {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            classifier: PayloadClassifier::new(config),
            transformer: PayloadTransformer::new(config),
        }
    }

    pub fn classifier(&self) -> &PayloadClassifier {
        &self.classifier
    }

    /// Build the alert for `msg`. Empty payloads yield `None`.
    ///
    /// Decode failures never drop the message: the payload is transformed
    /// again as the error's fallback decision.
    pub fn process(&self, msg: &InboundMessage) -> Option<ProcessedAlert> {
        if msg.payload.is_empty() {
            debug!(topic = %msg.topic, "empty payload, skipping");
            return None;
        }

        let decision = self.classifier.classify(&msg.topic, &msg.payload);
        #[cfg(feature = "metrics")]
        counter!(bridge_metrics::DECISIONS_TOTAL, "decision" => decision.as_str()).increment(1);

        match self.transformer.transform(decision, &msg.topic, &msg.payload) {
            Ok(alert) => Some(ProcessedAlert {
                decision,
                alert,
                fallback: None,
            }),
            Err(err) => {
                let fallback = err.fallback();
                warn!(
                    topic = %msg.topic,
                    %decision,
                    %fallback,
                    error = %err,
                    "payload decode failed, using fallback"
                );
                #[cfg(feature = "metrics")]
                counter!(bridge_metrics::DECODE_FALLBACKS_TOTAL, "decision" => decision.as_str())
                    .increment(1);

                // Fallback decisions (raw image, hex preview) cannot fail.
                let alert = self
                    .transformer
                    .transform(fallback, &msg.topic, &msg.payload)
                    .unwrap_or_else(|_| {
                        Alert::image(msg.payload.to_vec(), image_caption(&msg.topic))
                    });
                Some(ProcessedAlert {
                    decision,
                    alert,
                    fallback: Some(err),
                })
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::new(&ClassifierConfig {
            image_topics: vec!["cam/+/snapshot".into()],
            ..ClassifierConfig::default()
        })
    }

    #[test]
    fn empty_payload_produces_nothing() {
        let msg = InboundMessage::new("cam/a/snapshot", Vec::<u8>::new());
        assert!(pipeline().process(&msg).is_none());
    }

    #[test]
    fn jpeg_on_plain_topic() {
        let mut payload: Vec<u8> = vec![0xFF, 0xD8];
        payload.resize(20, 0x11);
        let processed = pipeline()
            .process(&InboundMessage::new("cam/front", payload.clone()))
            .unwrap();
        assert_eq!(processed.decision, ContentDecision::ImageBinary);
        assert_eq!(
            processed.alert,
            Alert::image(payload, "Alert image from topic: cam/front")
        );
        assert!(processed.fallback.is_none());
    }

    #[test]
    fn text_message() {
        let processed = pipeline()
            .process(&InboundMessage::new("sensor/door", "door opened"))
            .unwrap();
        assert_eq!(processed.decision, ContentDecision::Text);
        assert_eq!(
            processed.alert,
            Alert::text("Alert from sensor/door: door opened")
        );
    }

    #[test]
    fn broken_base64_falls_back_to_raw_image() {
        let payload = b"data:image/jpeg;base64,/9j/A".to_vec();
        let processed = pipeline()
            .process(&InboundMessage::new("cam/door", payload.clone()))
            .unwrap();
        assert_eq!(processed.decision, ContentDecision::ImageBase64);
        assert!(matches!(processed.fallback, Some(DecodeError::Base64(_))));
        assert_eq!(processed.alert.image_bytes(), Some(payload.as_slice()));
    }

    #[test]
    fn image_topic_text_is_sent_as_raw_image() {
        let processed = pipeline()
            .process(&InboundMessage::new("cam/back/snapshot", "not really a jpeg"))
            .unwrap();
        assert_eq!(processed.decision, ContentDecision::ImageBinary);
        assert_eq!(processed.alert.kind(), "image");
    }

    #[test]
    fn small_binary_gets_hex_preview() {
        let processed = pipeline()
            .process(&InboundMessage::new("dev/x", vec![0x00u8, 0x9F, 0x92]))
            .unwrap();
        assert_eq!(processed.decision, ContentDecision::UnknownBinary);
        assert_eq!(
            processed.alert,
            Alert::text("Alert from dev/x: [undisplayable binary payload, 3 bytes] 00 9f 92")
        );
    }
}
