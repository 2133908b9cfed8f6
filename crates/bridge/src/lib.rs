//! Bridge from an MQTT bus to chat alerts.
//!
//! Every inbound message runs through [`Pipeline`]: the
//! [`PayloadClassifier`] decides what the bytes are, the
//! [`PayloadTransformer`] turns them into an [`Alert`](mqttgram_common::Alert),
//! and the [`BridgeController`] hands the alert to the dispatcher for the
//! current subscribers. The controller also owns the bus connection
//! lifecycle, reconnecting with [`BackoffPolicy`].

pub mod backoff;
pub mod bus;
pub mod classifier;
pub mod controller;
pub mod error;
pub mod mqtt;
pub mod pipeline;
pub mod topic;
pub mod transform;

pub use {
    backoff::{BackoffPolicy, Sleeper, TokioSleeper},
    bus::{BusClient, BusEvent},
    classifier::{ContentDecision, PayloadClassifier},
    controller::{BridgeController, BridgeState, DEFAULT_ANNOUNCEMENT},
    error::{ConnectivityError, DecodeError},
    mqtt::MqttBus,
    pipeline::{Pipeline, ProcessedAlert},
    transform::PayloadTransformer,
};
