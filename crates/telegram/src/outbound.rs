use {
    async_trait::async_trait,
    mqttgram_channels::{AlertOutbound, DeliveryError},
    mqttgram_common::SubscriberId,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{ChatId, InputFile},
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use mqttgram_metrics::{counter, telegram as tg_metrics};

use crate::text::{MAX_CAPTION_CHARS, MAX_MESSAGE_CHARS, chunk_message, truncate_caption};

/// File name attached to alert images.
const IMAGE_FILE_NAME: &str = "alert.jpg";

/// Delivers alerts through the Telegram Bot API.
///
/// One call is one attempt; failures are classified and returned, never
/// retried here.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl AlertOutbound for TelegramOutbound {
    async fn send_text(&self, to: SubscriberId, body: &str) -> Result<(), DeliveryError> {
        let chat_id = ChatId(to.get());
        let chunks = chunk_message(body, MAX_MESSAGE_CHARS);
        for chunk in &chunks {
            self.bot
                .send_message(chat_id, chunk)
                .await
                .map_err(classify_request_error)?;
        }
        debug!(
            chat_id = to.get(),
            chunk_count = chunks.len(),
            text_len = body.len(),
            "telegram text alert sent"
        );
        Ok(())
    }

    async fn send_image(
        &self,
        to: SubscriberId,
        bytes: &[u8],
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let chat_id = ChatId(to.get());
        let caption = truncate_caption(caption, MAX_CAPTION_CHARS);

        let input = InputFile::memory(bytes.to_vec()).file_name(IMAGE_FILE_NAME);
        match self.bot.send_photo(chat_id, input).caption(&caption).await {
            Ok(_) => {
                debug!(chat_id = to.get(), bytes = bytes.len(), "telegram photo alert sent");
                Ok(())
            },
            Err(e) if is_photo_rejected(&e) => {
                warn!(
                    chat_id = to.get(),
                    error = %e,
                    "photo rejected, sending as document"
                );
                #[cfg(feature = "metrics")]
                counter!(tg_metrics::PHOTO_DOCUMENT_FALLBACKS_TOTAL).increment(1);

                let input = InputFile::memory(bytes.to_vec()).file_name(IMAGE_FILE_NAME);
                self.bot
                    .send_document(chat_id, input)
                    .caption(&caption)
                    .await
                    .map_err(classify_request_error)?;
                info!(chat_id = to.get(), "telegram image alert sent as document");
                Ok(())
            },
            Err(e) => Err(classify_request_error(e)),
        }
    }
}

/// Telegram refuses some valid JPEGs as photos (odd sizes, extreme aspect
/// ratios) but accepts them as documents.
fn is_photo_rejected(error: &RequestError) -> bool {
    let message = error.to_string();
    message.contains("PHOTO_INVALID_DIMENSIONS") || message.contains("PHOTO_SAVE_FILE_INVALID")
}

/// Telegram reports its own 5xx failures as API errors with the HTTP reason
/// phrase as description.
fn server_status(description: &str) -> Option<u16> {
    [
        ("Internal Server Error", 500),
        ("Bad Gateway", 502),
        ("Service Unavailable", 503),
        ("Gateway Timeout", 504),
    ]
    .into_iter()
    .find(|(phrase, _)| description.contains(phrase))
    .map(|(_, status)| status)
}

/// Map a teloxide error onto the delivery error taxonomy.
pub fn classify_request_error(error: RequestError) -> DeliveryError {
    match error {
        RequestError::RetryAfter(wait) => DeliveryError::RateLimited {
            retry_after_secs: wait.duration().as_secs(),
        },
        RequestError::Api(ApiError::Unknown(description)) => match server_status(&description) {
            Some(status) => DeliveryError::from_status(status, description),
            None => DeliveryError::Rejected(description),
        },
        RequestError::Api(api) => DeliveryError::Rejected(api.to_string()),
        RequestError::MigrateToChatId(new_id) => {
            DeliveryError::Rejected(format!("group migrated to supergroup {}", new_id.0))
        },
        RequestError::Network(e) => DeliveryError::Network(e.to_string()),
        RequestError::Io(e) => DeliveryError::Network(e.to_string()),
        other => DeliveryError::Other(other.to_string()),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, teloxide::types::Seconds};

    #[test]
    fn retry_after_is_rate_limited() {
        let err = classify_request_error(RequestError::RetryAfter(Seconds::from_seconds(42)));
        assert_eq!(
            err,
            DeliveryError::RateLimited {
                retry_after_secs: 42
            }
        );
    }

    #[test]
    fn api_errors_are_rejections() {
        let err = classify_request_error(RequestError::Api(ApiError::BotBlocked));
        assert_eq!(err.reason(), "rejected");
        let err = classify_request_error(RequestError::Api(ApiError::ChatNotFound));
        assert_eq!(err.reason(), "rejected");
    }

    #[test]
    fn telegram_server_errors_are_server() {
        let err = classify_request_error(RequestError::Api(ApiError::Unknown(
            "Bad Gateway".into(),
        )));
        assert_eq!(err.reason(), "server");
        let err = classify_request_error(RequestError::Api(ApiError::Unknown(
            "Bad Request: message is too long".into(),
        )));
        assert_eq!(err.reason(), "rejected");
    }

    #[test]
    fn io_errors_are_network() {
        let err = classify_request_error(RequestError::Io(std::io::Error::other("boom").into()));
        assert_eq!(err.reason(), "network");
    }

    #[test]
    fn photo_dimension_errors_trigger_document_fallback() {
        let err = RequestError::Api(ApiError::Unknown(
            "Bad Request: PHOTO_INVALID_DIMENSIONS".into(),
        ));
        assert!(is_photo_rejected(&err));
        assert!(!is_photo_rejected(&RequestError::Api(ApiError::BotBlocked)));
    }
}
