use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    futures::stream::{self, StreamExt},
    mqttgram_common::{Alert, SubscriberId},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use mqttgram_metrics::{counter, dispatch as dispatch_metrics, histogram};

use crate::outbound::{AlertOutbound, DeliveryError};

/// Result of delivering one alert to one recipient.
#[derive(Debug, Clone)]
pub struct RecipientOutcome {
    pub recipient: SubscriberId,
    pub result: Result<(), DeliveryError>,
    pub elapsed: Duration,
}

/// Per-recipient results of one dispatch call.
#[derive(Debug, Clone)]
pub enum DeliveryReport {
    /// Nobody is subscribed; the chat API was not contacted.
    NoSubscribers,
    /// One entry per recipient, in recipient order.
    Attempted(Vec<RecipientOutcome>),
}

impl DeliveryReport {
    #[must_use]
    pub fn outcomes(&self) -> &[RecipientOutcome] {
        match self {
            Self::NoSubscribers => &[],
            Self::Attempted(outcomes) => outcomes,
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes().iter().filter(|o| o.result.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes().iter().filter(|o| o.result.is_err()).count()
    }

    /// Result for one recipient, if it was part of this dispatch.
    #[must_use]
    pub fn result_for(&self, recipient: SubscriberId) -> Option<&Result<(), DeliveryError>> {
        self.outcomes()
            .iter()
            .find(|o| o.recipient == recipient)
            .map(|o| &o.result)
    }
}

/// Deliveries in flight at once unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Fans an alert out to a set of recipients.
///
/// Recipients are delivered to concurrently, at most `max_concurrent` at a
/// time and each under its own timeout, so one failing or stalled chat
/// never blocks or aborts the others. The call returns once every recipient
/// has succeeded, failed, or timed out.
#[derive(Clone)]
pub struct AlertDispatcher {
    outbound: Arc<dyn AlertOutbound>,
    timeout: Duration,
    max_concurrent: usize,
}

impl AlertDispatcher {
    pub fn new(outbound: Arc<dyn AlertOutbound>, timeout: Duration) -> Self {
        Self {
            outbound,
            timeout,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Limit how many recipients are contacted at once. Zero is treated as one.
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn dispatch(&self, alert: &Alert, recipients: &[SubscriberId]) -> DeliveryReport {
        if recipients.is_empty() {
            debug!(kind = alert.kind(), "no subscribers, alert not sent");
            #[cfg(feature = "metrics")]
            counter!(dispatch_metrics::NO_SUBSCRIBERS_TOTAL).increment(1);
            return DeliveryReport::NoSubscribers;
        }

        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::ALERTS_TOTAL, "kind" => alert.kind()).increment(1);

        let outcomes: Vec<RecipientOutcome> = stream::iter(recipients.iter().copied())
            .map(|recipient| self.deliver_one(alert, recipient))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let report = DeliveryReport::Attempted(outcomes);
        info!(
            kind = alert.kind(),
            recipients = recipients.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "alert dispatched"
        );
        report
    }

    async fn deliver_one(&self, alert: &Alert, recipient: SubscriberId) -> RecipientOutcome {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.outbound.deliver(recipient, alert))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        };
        let elapsed = start.elapsed();

        #[cfg(feature = "metrics")]
        histogram!(dispatch_metrics::DELIVERY_DURATION_SECONDS).record(elapsed.as_secs_f64());

        match &result {
            Ok(()) => {
                debug!(chat_id = %recipient, elapsed_ms = elapsed.as_millis() as u64, "alert delivered");
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::DELIVERIES_SUCCEEDED_TOTAL).increment(1);
            },
            Err(e) => {
                warn!(
                    chat_id = %recipient,
                    kind = alert.kind(),
                    reason = e.reason(),
                    error = %e,
                    "alert delivery failed"
                );
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::DELIVERIES_FAILED_TOTAL, "reason" => e.reason())
                    .increment(1);
            },
        }

        RecipientOutcome {
            recipient,
            result,
            elapsed,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        std::{
            collections::HashSet,
            sync::{
                Mutex,
                atomic::{AtomicUsize, Ordering},
            },
        },
    };

    /// Records every call; fails or stalls for configured recipients.
    #[derive(Default)]
    struct ScriptedOutbound {
        calls: Mutex<Vec<(SubscriberId, String)>>,
        failing: HashSet<SubscriberId>,
        stalled: HashSet<SubscriberId>,
    }

    impl ScriptedOutbound {
        async fn record(&self, to: SubscriberId, what: String) -> Result<(), DeliveryError> {
            self.calls.lock().unwrap().push((to, what));
            if self.stalled.contains(&to) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.failing.contains(&to) {
                return Err(DeliveryError::Rejected("403: chat not found".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AlertOutbound for ScriptedOutbound {
        async fn send_text(&self, to: SubscriberId, body: &str) -> Result<(), DeliveryError> {
            self.record(to, format!("text:{body}")).await
        }

        async fn send_image(
            &self,
            to: SubscriberId,
            bytes: &[u8],
            caption: &str,
        ) -> Result<(), DeliveryError> {
            self.record(to, format!("image:{}:{caption}", bytes.len()))
                .await
        }
    }

    fn ids(raw: &[i64]) -> Vec<SubscriberId> {
        raw.iter().copied().map(SubscriberId).collect()
    }

    /// Tracks how many deliveries overlap.
    #[derive(Default)]
    struct OverlapOutbound {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl AlertOutbound for OverlapOutbound {
        async fn send_text(&self, _to: SubscriberId, _body: &str) -> Result<(), DeliveryError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send_image(
            &self,
            to: SubscriberId,
            _bytes: &[u8],
            caption: &str,
        ) -> Result<(), DeliveryError> {
            self.send_text(to, caption).await
        }
    }

    #[tokio::test]
    async fn failure_for_one_recipient_does_not_stop_others() {
        let outbound = Arc::new(ScriptedOutbound {
            failing: HashSet::from([SubscriberId(2)]),
            ..Default::default()
        });
        let dispatcher = AlertDispatcher::new(outbound.clone(), Duration::from_secs(5));

        let report = dispatcher
            .dispatch(&Alert::text("Alert from sensor/door: door opened"), &ids(&[1, 2, 3]))
            .await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(report.result_for(SubscriberId(1)).unwrap().is_ok());
        assert!(matches!(
            report.result_for(SubscriberId(2)),
            Some(Err(DeliveryError::Rejected(_)))
        ));
        assert!(report.result_for(SubscriberId(3)).unwrap().is_ok());

        let mut called: Vec<i64> = outbound
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.0)
            .collect();
        called.sort_unstable();
        assert_eq!(called, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn report_keeps_recipient_order() {
        let outbound = Arc::new(ScriptedOutbound::default());
        let dispatcher = AlertDispatcher::new(outbound, Duration::from_secs(5));
        let recipients = ids(&[30, 10, 20]);

        let report = dispatcher.dispatch(&Alert::text("x"), &recipients).await;

        let order: Vec<SubscriberId> = report.outcomes().iter().map(|o| o.recipient).collect();
        assert_eq!(order, recipients);
    }

    #[tokio::test]
    async fn empty_recipient_list_contacts_nobody() {
        let outbound = Arc::new(ScriptedOutbound::default());
        let dispatcher = AlertDispatcher::new(outbound.clone(), Duration::from_secs(5));

        let report = dispatcher.dispatch(&Alert::text("x"), &[]).await;

        assert!(matches!(report, DeliveryReport::NoSubscribers));
        assert!(outbound.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stalled_recipient_times_out_alone() {
        let outbound = Arc::new(ScriptedOutbound {
            stalled: HashSet::from([SubscriberId(1)]),
            ..Default::default()
        });
        let dispatcher = AlertDispatcher::new(outbound, Duration::from_millis(50));

        let report = dispatcher
            .dispatch(&Alert::image(vec![0xFF, 0xD8], "cap"), &ids(&[1, 2]))
            .await;

        assert!(matches!(
            report.result_for(SubscriberId(1)),
            Some(Err(DeliveryError::Timeout(_)))
        ));
        assert!(report.result_for(SubscriberId(2)).unwrap().is_ok());
    }

    #[tokio::test]
    async fn image_alerts_use_send_image() {
        let outbound = Arc::new(ScriptedOutbound::default());
        let dispatcher = AlertDispatcher::new(outbound.clone(), Duration::from_secs(5));

        dispatcher
            .dispatch(
                &Alert::image(vec![1, 2, 3], "Alert image from topic: cam/front"),
                &ids(&[7]),
            )
            .await;

        let calls = outbound.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                SubscriberId(7),
                "image:3:Alert image from topic: cam/front".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn concurrency_is_capped_and_order_kept() {
        let outbound = Arc::new(OverlapOutbound::default());
        let dispatcher = AlertDispatcher::new(outbound.clone(), Duration::from_secs(5))
            .with_max_concurrent(3);
        let recipients: Vec<SubscriberId> = (1..=10).map(SubscriberId).collect();

        let report = dispatcher.dispatch(&Alert::text("x"), &recipients).await;

        assert_eq!(report.succeeded(), 10);
        let peak = outbound.peak.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak concurrency {peak}");
        let order: Vec<SubscriberId> = report.outcomes().iter().map(|o| o.recipient).collect();
        assert_eq!(order, recipients);
    }
}
