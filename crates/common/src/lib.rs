//! Shared types and error helpers used across all mqttgram crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{Alert, InboundMessage, SubscriberId},
};
