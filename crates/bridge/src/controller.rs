use std::{fmt, sync::Arc, time::Instant};

use {
    mqttgram_channels::{AlertDispatcher, DeliveryReport, SubscriberRegistry},
    mqttgram_common::{Alert, InboundMessage},
    tokio::sync::watch,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use mqttgram_metrics::{bridge as bridge_metrics, counter, gauge, histogram};

use crate::{
    backoff::{BackoffPolicy, Sleeper, TokioSleeper},
    bus::{BusClient, BusEvent},
    error::ConnectivityError,
    pipeline::Pipeline,
};

/// Sent to every subscriber each time the bridge (re)subscribes.
pub const DEFAULT_ANNOUNCEMENT: &str = "Telegram bot connected and ready for alerts!";

/// Connection state of the bridge, observable through
/// [`BridgeController::subscribe_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    #[default]
    Disconnected,
    Connecting,
    Subscribed,
}

impl BridgeState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
        }
    }

    #[cfg(feature = "metrics")]
    fn gauge_value(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Subscribed => 2.0,
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the inner event loop returned.
enum SessionEnd {
    Reconnect,
    Stop,
}

/// Turns bus messages into deliveries. Kept apart from the bus so the
/// controller's futures stay `Send` for buses that are not `Sync`.
struct Router {
    pipeline: Pipeline,
    dispatcher: AlertDispatcher,
    registry: Arc<SubscriberRegistry>,
    announcement: Option<String>,
}

/// Owns the bus session and routes every inbound message through the
/// pipeline to the current subscribers.
///
/// Messages are handled one at a time in arrival order. Nothing that
/// happens to a single message (decode failure, delivery failure, no
/// subscribers) stops the loop; only cancellation or a closed bus does.
pub struct BridgeController<B> {
    bus: B,
    topic: String,
    router: Router,
    backoff: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
    state: watch::Sender<BridgeState>,
}

impl<B: BusClient> BridgeController<B> {
    pub fn new(
        bus: B,
        topic: impl Into<String>,
        pipeline: Pipeline,
        dispatcher: AlertDispatcher,
        registry: Arc<SubscriberRegistry>,
        backoff: BackoffPolicy,
    ) -> Self {
        let (state, _) = watch::channel(BridgeState::Disconnected);
        Self {
            bus,
            topic: topic.into(),
            router: Router {
                pipeline,
                dispatcher,
                registry,
                announcement: Some(DEFAULT_ANNOUNCEMENT.to_string()),
            },
            backoff,
            sleeper: Arc::new(TokioSleeper),
            state,
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the connect announcement. `None` disables it.
    #[must_use]
    pub fn with_announcement(mut self, announcement: Option<String>) -> Self {
        self.router.announcement = announcement;
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Run until `cancel` fires or the bus closes.
    ///
    /// Connection failures and disconnects are retried forever with
    /// backoff. The attempt counter resets once a session is established.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(topic = %self.topic, "bridge starting");
        let mut attempt: u32 = 0;

        loop {
            self.set_state(BridgeState::Connecting);
            #[cfg(feature = "metrics")]
            counter!(bridge_metrics::CONNECT_ATTEMPTS_TOTAL).increment(1);

            let established = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.establish() => result,
            };

            let end = match established {
                Ok(()) => {
                    attempt = 0;
                    self.set_state(BridgeState::Subscribed);
                    info!(topic = %self.topic, "subscribed to bus");
                    self.router.announce().await;
                    self.pump(&cancel).await
                },
                Err(err) => {
                    warn!(error = %err, attempt, "bus connection failed");
                    #[cfg(feature = "metrics")]
                    counter!(bridge_metrics::CONNECT_FAILURES_TOTAL).increment(1);
                    SessionEnd::Reconnect
                },
            };
            self.set_state(BridgeState::Disconnected);

            if matches!(end, SessionEnd::Stop) {
                break;
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            info!(delay_ms = delay.as_millis() as u64, attempt, "reconnecting after delay");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.sleeper.sleep(delay) => {},
            }
        }

        self.set_state(BridgeState::Disconnected);
        self.bus.disconnect().await;
        info!("bridge stopped");
    }

    /// Build and deliver the alert for one message.
    ///
    /// Returns `None` when the message produced no alert (empty payload).
    pub async fn handle_message(&self, msg: &InboundMessage) -> Option<DeliveryReport> {
        self.router.handle_message(msg).await
    }

    async fn establish(&mut self) -> Result<(), ConnectivityError> {
        self.bus.connect().await?;
        self.bus.subscribe(&self.topic).await
    }

    async fn pump(&mut self, cancel: &CancellationToken) -> SessionEnd {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => return SessionEnd::Stop,
                event = self.bus.next_event() => event,
            };

            match event {
                Some(BusEvent::Message(msg)) => {
                    self.router.handle_message(&msg).await;
                },
                Some(BusEvent::Connected) => {
                    info!("bus session re-established, resubscribing");
                    if let Err(err) = self.bus.subscribe(&self.topic).await {
                        warn!(error = %err, "resubscribe failed");
                        return SessionEnd::Reconnect;
                    }
                    self.router.announce().await;
                },
                Some(BusEvent::Disconnected { reason }) => {
                    warn!(%reason, "bus disconnected");
                    #[cfg(feature = "metrics")]
                    counter!(bridge_metrics::DISCONNECTS_TOTAL).increment(1);
                    return SessionEnd::Reconnect;
                },
                None => {
                    info!("bus closed");
                    return SessionEnd::Stop;
                },
            }
        }
    }

    fn set_state(&self, next: BridgeState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "bridge state changed");
            #[cfg(feature = "metrics")]
            gauge!(bridge_metrics::STATE).set(next.gauge_value());
        }
    }
}

impl Router {
    async fn handle_message(&self, msg: &InboundMessage) -> Option<DeliveryReport> {
        #[cfg(feature = "metrics")]
        counter!(bridge_metrics::MESSAGES_RECEIVED_TOTAL).increment(1);
        let start = Instant::now();

        let Some(processed) = self.pipeline.process(msg) else {
            #[cfg(feature = "metrics")]
            counter!(bridge_metrics::MESSAGES_DROPPED_TOTAL).increment(1);
            return None;
        };
        debug!(
            topic = %msg.topic,
            decision = %processed.decision,
            kind = processed.alert.kind(),
            "payload classified"
        );

        let recipients = self.registry.list().await;
        let report = self.dispatcher.dispatch(&processed.alert, &recipients).await;

        #[cfg(feature = "metrics")]
        histogram!(bridge_metrics::MESSAGE_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        debug!(
            topic = %msg.topic,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "message handled"
        );
        Some(report)
    }

    async fn announce(&self) {
        let Some(text) = &self.announcement else {
            return;
        };
        let recipients = self.registry.list().await;
        let report = self.dispatcher.dispatch(&Alert::text(text.as_str()), &recipients).await;
        if report.failed() > 0 {
            warn!(failed = report.failed(), "connect announcement not delivered to everyone");
        }
    }
}
