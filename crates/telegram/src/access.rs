use {
    mqttgram_channels::gating,
    mqttgram_common::SubscriberId,
    mqttgram_config::TelegramConfig,
};

/// Who may subscribe.
///
/// The admin chat is always allowed. Everyone else is checked against the
/// allow-list, where an empty list means open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub admin: Option<SubscriberId>,
    pub allowlist: Vec<String>,
}

impl AccessPolicy {
    pub fn from_config(config: &TelegramConfig) -> Self {
        Self {
            admin: config.admin_chat_id.map(SubscriberId),
            allowlist: config.allowlist.clone(),
        }
    }

    pub fn check(&self, chat_id: SubscriberId, username: Option<&str>) -> Result<(), AccessDenied> {
        if self.admin == Some(chat_id) {
            return Ok(());
        }
        if gating::is_allowed(chat_id, username, &self.allowlist) {
            Ok(())
        } else {
            Err(AccessDenied::NotOnAllowlist)
        }
    }
}

/// Reason a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    NotOnAllowlist,
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotOnAllowlist => write!(f, "chat not on allowlist"),
        }
    }
}
