use std::{sync::Arc, time::Duration};

use {
    mqttgram_common::SubscriberId,
    mqttgram_config::TelegramConfig,
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use mqttgram_metrics::{counter, telegram as tg_metrics};

use crate::{
    error::{Error, Result},
    handlers::{ChatInfo, Command, CommandHandler},
};

/// Extra HTTP time on top of the long-poll timeout, so the client never
/// aborts a getUpdates call Telegram is still holding open.
const HTTP_TIMEOUT_MARGIN_SECS: u64 = 15;

/// Wait after a failed getUpdates call.
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

/// Build a bot client for `config`.
pub fn build_bot(config: &TelegramConfig) -> Result<Bot> {
    if !config.has_token() {
        return Err(Error::message("telegram bot token is not set"));
    }
    let timeout = u64::from(config.poll_timeout_secs) + HTTP_TIMEOUT_MARGIN_SECS;
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(timeout))
        .build()?;
    Ok(Bot::with_client(config.token.expose_secret(), client))
}

/// Verify the bot, register its commands and start the long-polling loop.
///
/// Returns once the bot is verified; the loop runs on its own task until
/// `cancel` fires.
pub async fn start_polling(
    bot: Bot,
    config: &TelegramConfig,
    handler: Arc<CommandHandler>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();

    // Long polling does not work while a webhook is set.
    bot.delete_webhook().send().await?;

    let commands = vec![
        BotCommand::new("start", "Receive alerts in this chat"),
        BotCommand::new("stop", "Stop receiving alerts"),
        BotCommand::new("status", "Show bridge status"),
        BotCommand::new("help", "Show available commands"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = ?bot_username, "telegram bot connected (webhook cleared)");

    let poll_timeout = config.poll_timeout_secs;
    Ok(tokio::spawn(async move {
        poll_loop(bot, bot_username, poll_timeout, handler, cancel).await;
    }))
}

async fn poll_loop(
    bot: Bot,
    bot_username: Option<String>,
    poll_timeout: u32,
    handler: Arc<CommandHandler>,
    cancel: CancellationToken,
) {
    info!("starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        let request = bot
            .get_updates()
            .offset(offset)
            .timeout(poll_timeout)
            .allowed_updates(vec![AllowedUpdate::Message]);
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = request.send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    #[cfg(feature = "metrics")]
                    counter!(tg_metrics::UPDATES_RECEIVED_TOTAL).increment(1);

                    match update.kind {
                        UpdateKind::Message(msg) => {
                            if let Err(e) =
                                handle_message(&bot, &msg, bot_username.as_deref(), &handler).await
                            {
                                error!(
                                    chat_id = msg.chat.id.0,
                                    error = %e,
                                    "error handling telegram message"
                                );
                            }
                        },
                        other => debug!("ignoring non-message update: {other:?}"),
                    }
                }
            },
            Err(e) => {
                if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                    error!(
                        "telegram polling stopped: another instance is already running with this token"
                    );
                    break;
                }

                warn!(error = %e, "telegram getUpdates failed");
                #[cfg(feature = "metrics")]
                counter!(tg_metrics::POLLING_ERRORS_TOTAL).increment(1);
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(POLL_ERROR_DELAY) => {},
                }
            },
        }
    }
    info!("telegram polling stopped");
}

async fn handle_message(
    bot: &Bot,
    msg: &Message,
    bot_username: Option<&str>,
    handler: &CommandHandler,
) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(command) = Command::parse(text, bot_username) else {
        debug!(chat_id = msg.chat.id.0, "ignoring non-command message");
        return Ok(());
    };

    let chat = ChatInfo {
        chat_id: SubscriberId(msg.chat.id.0),
        username: msg
            .from
            .as_ref()
            .and_then(|u| u.username.clone())
            .or_else(|| msg.chat.username().map(str::to_string)),
    };
    debug!(chat_id = %chat.chat_id, command = command.name(), "received command");

    let reply = handler.handle(&command, &chat).await;
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}
