//! [`BusClient`] over an MQTT broker, using rumqttc.
//!
//! Every [`connect`](BusClient::connect) builds a fresh client and event
//! loop. A connection error tears the session down and is reported as
//! [`BusEvent::Disconnected`], so reconnect timing stays with the
//! controller's backoff instead of rumqttc's immediate retry.

use std::time::Duration;

use {
    async_trait::async_trait,
    mqttgram_common::InboundMessage,
    mqttgram_config::MqttConfig,
    rumqttc::{
        AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, LastWill, MqttOptions,
        Outgoing, Packet, QoS, SubscribeReasonCode,
    },
    tracing::{debug, info, warn},
};

use crate::{
    bus::{BusClient, BusEvent},
    error::ConnectivityError,
    topic::status_topic,
};

/// Capacity of the request channel between the client and its event loop.
const REQUEST_CAPACITY: usize = 32;

/// How long `disconnect` keeps polling to flush the DISCONNECT packet.
const DISCONNECT_FLUSH: Duration = Duration::from_millis(500);

struct Session {
    client: AsyncClient,
    event_loop: EventLoop,
}

pub struct MqttBus {
    config: MqttConfig,
    qos: QoS,
    status_topic: String,
    session: Option<Session>,
}

impl MqttBus {
    pub fn new(config: &MqttConfig) -> Self {
        Self {
            config: config.clone(),
            qos: qos_from_level(config.qos),
            status_topic: status_topic(&config.topic),
            session: None,
        }
    }

    /// Topic carrying the retained last-will message.
    pub fn status_topic(&self) -> &str {
        &self.status_topic
    }

    fn options(&self) -> MqttOptions {
        let cfg = &self.config;
        let mut options = MqttOptions::new(&cfg.client_id, &cfg.broker, cfg.port);
        options
            .set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.max(5)))
            .set_clean_session(true)
            .set_max_packet_size(cfg.max_packet_bytes, cfg.max_packet_bytes);
        if let Some(username) = &cfg.username {
            options.set_credentials(username, cfg.password.clone().unwrap_or_default());
        }
        if let Some(will) = &cfg.last_will {
            options.set_last_will(LastWill::new(
                &self.status_topic,
                will.clone(),
                self.qos,
                true,
            ));
        }
        options
    }

    async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), ConnectivityError> {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!(session_present = ack.session_present, "connack received");
                    return Ok(());
                },
                Ok(other) => debug!(event = ?other, "event before connack"),
                Err(err) => return Err(connection_error(err)),
            }
        }
    }
}

#[async_trait]
impl BusClient for MqttBus {
    async fn connect(&mut self) -> Result<(), ConnectivityError> {
        self.session = None;
        let (client, mut event_loop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        match tokio::time::timeout(timeout, Self::wait_for_connack(&mut event_loop)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectivityError::Timeout {
                    timeout_millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            },
        }

        // Clear a last will left behind by an earlier unclean exit.
        if self.config.last_will.is_some()
            && let Err(e) = client
                .publish(&self.status_topic, self.qos, true, Vec::<u8>::new())
                .await
        {
            warn!(topic = %self.status_topic, error = %e, "failed to clear retained status");
        }

        info!(
            broker = %self.config.broker,
            port = self.config.port,
            client_id = %self.config.client_id,
            "connected to MQTT broker"
        );
        self.session = Some(Session { client, event_loop });
        Ok(())
    }

    async fn subscribe(&mut self, pattern: &str) -> Result<(), ConnectivityError> {
        let Some(session) = &self.session else {
            return Err(ConnectivityError::Subscribe {
                pattern: pattern.to_string(),
                reason: "not connected".into(),
            });
        };
        session
            .client
            .subscribe(pattern, self.qos)
            .await
            .map_err(|e| ConnectivityError::Subscribe {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        info!(pattern, qos = ?self.qos, "subscription requested");
        Ok(())
    }

    async fn next_event(&mut self) -> Option<BusEvent> {
        loop {
            let session = match self.session.as_mut() {
                Some(session) => session,
                None => {
                    return Some(BusEvent::Disconnected {
                        reason: "no active session".into(),
                    });
                },
            };

            match session.event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = %publish.topic, bytes = publish.payload.len(), "publish received");
                    return Some(BusEvent::Message(InboundMessage::new(
                        publish.topic,
                        publish.payload,
                    )));
                },
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Some(BusEvent::Connected),
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        warn!(pkid = ack.pkid, "broker rejected subscription");
                    } else {
                        debug!(pkid = ack.pkid, "subscription acknowledged");
                    }
                },
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.session = None;
                    return Some(BusEvent::Disconnected {
                        reason: "broker sent DISCONNECT".into(),
                    });
                },
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    self.session = None;
                    return None;
                },
                Ok(_) => {},
                Err(err) => {
                    self.session = None;
                    return Some(BusEvent::Disconnected {
                        reason: connection_error(err).to_string(),
                    });
                },
            }
        }
    }

    async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Err(e) = session.client.try_disconnect() {
            debug!(error = %e, "disconnect request not queued");
            return;
        }
        // Drive the loop until the DISCONNECT packet is written.
        let flush = async {
            loop {
                match session.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {},
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_FLUSH, flush).await.is_err() {
            debug!("disconnect not flushed in time");
        }
        info!("disconnected from MQTT broker");
    }
}

fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

fn connection_error(err: ConnectionError) -> ConnectivityError {
    match err {
        ConnectionError::ConnectionRefused(code) => {
            ConnectivityError::Rejected(refusal_reason(code).to_string())
        },
        other => ConnectivityError::Network(other.to_string()),
    }
}

fn refusal_reason(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Success => "accepted",
        ConnectReturnCode::RefusedProtocolVersion => "unsupported protocol version",
        ConnectReturnCode::BadClientId => "client id rejected",
        ConnectReturnCode::ServiceUnavailable => "service unavailable",
        ConnectReturnCode::BadUserNamePassword => "bad username or password",
        ConnectReturnCode::NotAuthorized => "not authorized",
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_levels() {
        assert_eq!(qos_from_level(0), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2), QoS::ExactlyOnce);
    }

    #[test]
    fn refused_connection_is_rejected() {
        let err = connection_error(ConnectionError::ConnectionRefused(
            ConnectReturnCode::NotAuthorized,
        ));
        assert_eq!(err, ConnectivityError::Rejected("not authorized".into()));
    }

    #[test]
    fn io_failure_is_network() {
        let err = connection_error(ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )));
        assert!(matches!(err, ConnectivityError::Network(_)));
    }

    #[test]
    fn status_topic_follows_subscription() {
        let bus = MqttBus::new(&MqttConfig::default());
        assert_eq!(bus.status_topic(), "agentdvr/status");
    }

    #[tokio::test]
    async fn subscribe_before_connect_fails() {
        let mut bus = MqttBus::new(&MqttConfig::default());
        let err = bus.subscribe("agentdvr/#").await.unwrap_err();
        assert!(matches!(err, ConnectivityError::Subscribe { .. }));
    }
}
