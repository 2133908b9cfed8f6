//! Telegram side of the bridge.
//!
//! [`TelegramOutbound`] delivers alerts through the Bot API. The polling
//! loop in [`bot`] serves the subscription commands (`/start`, `/stop`,
//! `/status`, `/help`) handled by [`CommandHandler`].

pub mod access;
pub mod bot;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod text;

pub use {
    access::{AccessDenied, AccessPolicy},
    bot::{build_bot, start_polling},
    error::{Error, Result},
    handlers::{ChatInfo, Command, CommandHandler},
    outbound::TelegramOutbound,
};
