//! Alert delivery and subscriber management.
//!
//! A chat platform implements [`AlertOutbound`]; [`AlertDispatcher`] fans an
//! alert out to every recipient with per-recipient isolation, and
//! [`SubscriberRegistry`] owns the durable recipient list.

pub mod dispatch;
pub mod error;
pub mod gating;
pub mod outbound;
pub mod registry;
pub mod store;

pub use {
    dispatch::{AlertDispatcher, DEFAULT_MAX_CONCURRENT, DeliveryReport, RecipientOutcome},
    error::{Error, Result},
    outbound::{AlertOutbound, DeliveryError},
    registry::{AddOutcome, RemoveOutcome, SubscriberRegistry},
    store::{JsonFileSubscriberStore, MemorySubscriberStore, Mutation, SubscriberStore},
};
