use {async_trait::async_trait, mqttgram_common::InboundMessage};

use crate::error::ConnectivityError;

/// Something that happened on the bus connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// The session was (re-)established by the client itself.
    Connected,
    Message(InboundMessage),
    /// The connection dropped. The controller reconnects with backoff.
    Disconnected { reason: String },
}

/// A publish/subscribe bus the bridge listens on.
///
/// `next_event` is polled from a single task; implementations need not be
/// `Sync`.
#[async_trait]
pub trait BusClient: Send {
    /// Open a session. Returns once the broker accepted it.
    async fn connect(&mut self) -> Result<(), ConnectivityError>;

    async fn subscribe(&mut self, pattern: &str) -> Result<(), ConnectivityError>;

    /// Wait for the next event. `None` means the bus is closed for good
    /// and the controller should stop.
    async fn next_event(&mut self) -> Option<BusEvent>;

    /// Close the session cleanly, if one is open.
    async fn disconnect(&mut self);
}
