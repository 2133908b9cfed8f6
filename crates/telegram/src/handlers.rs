use std::sync::Arc;

use {
    mqttgram_bridge::BridgeState,
    mqttgram_channels::{AddOutcome, RemoveOutcome, SubscriberRegistry},
    mqttgram_common::SubscriberId,
    tokio::sync::watch,
    tracing::{info, warn},
};

#[cfg(feature = "metrics")]
use mqttgram_metrics::{counter, telegram as tg_metrics};

use crate::access::AccessPolicy;

pub const HELP_TEXT: &str = "\
/start - receive alerts in this chat
/stop - stop receiving alerts
/status - show bridge and subscription status
/help - show this message";

const PRIVATE_BOT: &str = "This bot is private.";

/// A bot command addressed to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Help,
    Unknown(String),
}

impl Command {
    /// Parse the command at the start of a message.
    ///
    /// Returns `None` for plain text and for commands addressed to another
    /// bot (`/start@other_bot`).
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let word = text.trim_start().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let (name, target) = match name.split_once('@') {
            Some((name, target)) => (name, Some(target)),
            None => (name, None),
        };
        if let (Some(target), Some(me)) = (target, bot_username)
            && !target.eq_ignore_ascii_case(me)
        {
            return None;
        }

        Some(match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "status" => Self::Status,
            "help" => Self::Help,
            _ => Self::Unknown(name.to_string()),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Status => "status",
            Self::Help => "help",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// The chat a command came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    pub chat_id: SubscriberId,
    pub username: Option<String>,
}

/// Answers subscription commands.
///
/// Replies are returned as text; sending them is the polling loop's job.
pub struct CommandHandler {
    registry: Arc<SubscriberRegistry>,
    access: AccessPolicy,
    bridge_state: watch::Receiver<BridgeState>,
}

impl CommandHandler {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        access: AccessPolicy,
        bridge_state: watch::Receiver<BridgeState>,
    ) -> Self {
        Self {
            registry,
            access,
            bridge_state,
        }
    }

    pub async fn handle(&self, command: &Command, chat: &ChatInfo) -> String {
        #[cfg(feature = "metrics")]
        counter!(tg_metrics::COMMANDS_TOTAL, "command" => command.name().to_string()).increment(1);

        // Leaving and reading help stay open so a chat dropped from the
        // allow-list can still unsubscribe.
        if matches!(command, Command::Start | Command::Status)
            && let Err(reason) = self.access.check(chat.chat_id, chat.username.as_deref())
        {
            warn!(
                chat_id = %chat.chat_id,
                username = ?chat.username,
                command = command.name(),
                %reason,
                "command refused"
            );
            #[cfg(feature = "metrics")]
            counter!(tg_metrics::ACCESS_DENIALS_TOTAL).increment(1);
            return PRIVATE_BOT.to_string();
        }

        match command {
            Command::Start => match self.registry.add(chat.chat_id).await {
                Ok(AddOutcome::Added) => {
                    info!(chat_id = %chat.chat_id, username = ?chat.username, "chat subscribed");
                    "Subscribed. You will receive alerts.".to_string()
                },
                Ok(AddOutcome::AlreadySubscribed) => "You are already subscribed.".to_string(),
                Err(e) => not_saved(&e),
            },
            Command::Stop => match self.registry.remove(chat.chat_id).await {
                Ok(RemoveOutcome::Removed) => {
                    info!(chat_id = %chat.chat_id, "chat unsubscribed");
                    "Unsubscribed.".to_string()
                },
                Ok(RemoveOutcome::NotSubscribed) => "You were not subscribed.".to_string(),
                Err(e) => not_saved(&e),
            },
            Command::Status => self.status(chat.chat_id).await,
            Command::Help => HELP_TEXT.to_string(),
            Command::Unknown(name) => format!("Unknown command /{name}.\n\n{HELP_TEXT}"),
        }
    }

    async fn status(&self, chat_id: SubscriberId) -> String {
        let state = *self.bridge_state.borrow();
        let subscribed = if self.registry.contains(chat_id).await {
            "This chat is subscribed."
        } else {
            "This chat is not subscribed. Send /start to receive alerts."
        };
        format!(
            "Bridge: {state}\nSubscribers: {}\n{subscribed}",
            self.registry.len().await
        )
    }
}

fn not_saved(error: &mqttgram_channels::Error) -> String {
    format!("Your subscription change may not have been saved: {error}")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        mqttgram_channels::{Error, MemorySubscriberStore, Result, SubscriberStore},
        rstest::rstest,
    };

    struct ReadOnlyStore;

    #[async_trait]
    impl SubscriberStore for ReadOnlyStore {
        async fn load(&self) -> Result<Vec<SubscriberId>> {
            Ok(Vec::new())
        }

        async fn save(&self, _ids: &[SubscriberId]) -> Result<()> {
            Err(Error::persistence(
                "writing subscribers.json",
                std::io::Error::other("read-only file system"),
            ))
        }
    }

    fn chat(id: i64) -> ChatInfo {
        ChatInfo {
            chat_id: SubscriberId(id),
            username: None,
        }
    }

    async fn handler_with(
        store: Arc<dyn SubscriberStore>,
        access: AccessPolicy,
    ) -> (CommandHandler, watch::Sender<BridgeState>) {
        let registry = Arc::new(SubscriberRegistry::load(store).await.unwrap());
        let (tx, rx) = watch::channel(BridgeState::Subscribed);
        (CommandHandler::new(registry, access, rx), tx)
    }

    async fn handler() -> (CommandHandler, watch::Sender<BridgeState>) {
        handler_with(Arc::new(MemorySubscriberStore::new()), AccessPolicy::default()).await
    }

    #[rstest]
    #[case("/start", Some(Command::Start))]
    #[case("  /STOP now", Some(Command::Stop))]
    #[case("/status@alerts_bot", Some(Command::Status))]
    #[case("/help@Alerts_Bot", Some(Command::Help))]
    #[case("/start@other_bot", None)]
    #[case("/frobnicate", Some(Command::Unknown("frobnicate".into())))]
    #[case("hello there", None)]
    #[case("", None)]
    fn parse_commands(#[case] text: &str, #[case] expected: Option<Command>) {
        assert_eq!(Command::parse(text, Some("alerts_bot")), expected);
    }

    #[tokio::test]
    async fn start_then_stop() {
        let (h, _state) = handler().await;

        assert_eq!(
            h.handle(&Command::Start, &chat(1)).await,
            "Subscribed. You will receive alerts."
        );
        assert_eq!(
            h.handle(&Command::Start, &chat(1)).await,
            "You are already subscribed."
        );
        assert_eq!(h.handle(&Command::Stop, &chat(1)).await, "Unsubscribed.");
        assert_eq!(
            h.handle(&Command::Stop, &chat(1)).await,
            "You were not subscribed."
        );
    }

    #[tokio::test]
    async fn persistence_failure_is_reported() {
        let (h, _state) = handler_with(Arc::new(ReadOnlyStore), AccessPolicy::default()).await;

        let reply = h.handle(&Command::Start, &chat(1)).await;
        assert!(
            reply.starts_with("Your subscription change may not have been saved:"),
            "{reply}"
        );
        assert!(reply.contains("read-only file system"), "{reply}");
    }

    #[tokio::test]
    async fn allowlist_blocks_start_but_not_stop() {
        let access = AccessPolicy {
            admin: Some(SubscriberId(100)),
            allowlist: vec!["friend".into()],
        };
        let (h, _state) = handler_with(Arc::new(MemorySubscriberStore::new()), access).await;

        assert_eq!(h.handle(&Command::Start, &chat(5)).await, "This bot is private.");
        assert_eq!(h.handle(&Command::Status, &chat(5)).await, "This bot is private.");
        assert_eq!(
            h.handle(&Command::Stop, &chat(5)).await,
            "You were not subscribed."
        );

        let friend = ChatInfo {
            chat_id: SubscriberId(6),
            username: Some("friend".into()),
        };
        assert_eq!(
            h.handle(&Command::Start, &friend).await,
            "Subscribed. You will receive alerts."
        );
        assert_eq!(
            h.handle(&Command::Start, &chat(100)).await,
            "Subscribed. You will receive alerts."
        );
    }

    #[tokio::test]
    async fn status_reflects_bridge_state() {
        let (h, state) = handler().await;
        h.handle(&Command::Start, &chat(1)).await;

        let reply = h.handle(&Command::Status, &chat(1)).await;
        assert_eq!(
            reply,
            "Bridge: subscribed\nSubscribers: 1\nThis chat is subscribed."
        );

        state.send_replace(BridgeState::Connecting);
        let reply = h.handle(&Command::Status, &chat(2)).await;
        assert!(reply.starts_with("Bridge: connecting\n"), "{reply}");
        assert!(reply.ends_with("Send /start to receive alerts."), "{reply}");
    }

    #[tokio::test]
    async fn help_and_unknown() {
        let (h, _state) = handler().await;
        assert_eq!(h.handle(&Command::Help, &chat(1)).await, HELP_TEXT);
        let reply = h.handle(&Command::Unknown("foo".into()), &chat(1)).await;
        assert!(reply.starts_with("Unknown command /foo."));
        assert!(reply.contains("/start"));
    }
}
