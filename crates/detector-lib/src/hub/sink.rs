//! Delivery of a subscription to a transport

use super::{DistributionHub, Subscription};
use crate::error::DetectorError;
use crate::models::HistoryRecord;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A transport endpoint that accepts serialized records
#[async_trait]
pub trait RecordSink: Send {
    /// Send one JSON-encoded record
    async fn deliver(&mut self, payload: &str) -> Result<(), DetectorError>;
}

/// Why a pump stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// The hub dropped the subscription
    Closed,
    /// The sink reported an error
    SinkFailed(String),
    /// A single delivery exceeded the send timeout
    TimedOut,
}

/// Deliver a subscription's replay followed by its live records
///
/// Runs until the subscription ends or a delivery fails. Any failure
/// unsubscribes from the hub before returning.
pub async fn pump<S: RecordSink>(
    hub: Arc<DistributionHub>,
    subscription: Subscription,
    mut sink: S,
    send_timeout: Duration,
) -> PumpExit {
    let Subscription {
        id,
        replay,
        mut receiver,
    } = subscription;

    for record in replay {
        if let Err(exit) = send(&mut sink, &record, send_timeout).await {
            hub.unsubscribe(id);
            return exit;
        }
    }

    while let Some(record) = receiver.recv().await {
        if let Err(exit) = send(&mut sink, &record, send_timeout).await {
            hub.unsubscribe(id);
            return exit;
        }
    }

    debug!(subscriber_id = id, "Subscription closed by hub");
    PumpExit::Closed
}

async fn send<S: RecordSink>(
    sink: &mut S,
    record: &HistoryRecord,
    send_timeout: Duration,
) -> Result<(), PumpExit> {
    let payload = match record.to_json() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(seq = record.seq, error = %e, "Skipping record that failed to serialize");
            return Ok(());
        }
    };

    match tokio::time::timeout(send_timeout, sink.deliver(&payload)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PumpExit::SinkFailed(e.to_string())),
        Err(_) => Err(PumpExit::TimedOut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricKind, Prediction, Sample, SampleKey, Verdict};
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct VecSink {
        payloads: Arc<Mutex<Vec<String>>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl RecordSink for VecSink {
        async fn deliver(&mut self, payload: &str) -> Result<(), DetectorError> {
            let mut payloads = self.payloads.lock().unwrap();
            if self.fail_after == Some(payloads.len()) {
                return Err(DetectorError::TransportFailure("peer reset".to_string()));
            }
            payloads.push(payload.to_string());
            Ok(())
        }
    }

    struct StuckSink;

    #[async_trait]
    impl RecordSink for StuckSink {
        async fn deliver(&mut self, _payload: &str) -> Result<(), DetectorError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn record(value: f64) -> HistoryRecord {
        let key = SampleKey::new(7, MetricKind::Memory);
        let sample = Sample::new(key.clone(), Utc::now(), value);
        HistoryRecord::new(sample, Prediction::new(key, value, Verdict::Unknown))
    }

    #[tokio::test]
    async fn test_pump_delivers_replay_then_closes() {
        let hub = Arc::new(DistributionHub::new(10, 4));
        hub.publish(record(1.0));
        hub.publish(record(2.0));

        let sub = hub.subscribe();
        hub.close_all();

        let sink = VecSink::default();
        let exit = pump(Arc::clone(&hub), sub, sink.clone(), Duration::from_secs(1)).await;

        assert_eq!(exit, PumpExit::Closed);
        let payloads = sink.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 2);
        assert!(payloads[0].contains("\"seq\":1"));
    }

    #[tokio::test]
    async fn test_pump_forwards_live_records() {
        let hub = Arc::new(DistributionHub::new(10, 4));
        let sub = hub.subscribe();
        let sink = VecSink::default();

        let task = tokio::spawn(pump(Arc::clone(&hub), sub, sink.clone(), Duration::from_secs(1)));
        hub.publish(record(1.0));
        hub.publish(record(2.0));

        for _ in 0..100 {
            if sink.payloads.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        hub.close_all();

        assert_eq!(task.await.unwrap(), PumpExit::Closed);
        assert_eq!(sink.payloads.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sink_failure_unsubscribes() {
        let hub = Arc::new(DistributionHub::new(10, 4));
        hub.publish(record(1.0));
        hub.publish(record(2.0));

        let sub = hub.subscribe();
        let sink = VecSink {
            payloads: Arc::default(),
            fail_after: Some(1),
        };

        let exit = pump(Arc::clone(&hub), sub, sink, Duration::from_secs(1)).await;
        assert!(matches!(exit, PumpExit::SinkFailed(_)));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stuck_sink_times_out() {
        let hub = Arc::new(DistributionHub::new(10, 4));
        hub.publish(record(1.0));

        let sub = hub.subscribe();
        let exit = pump(Arc::clone(&hub), sub, StuckSink, Duration::from_millis(20)).await;
        assert_eq!(exit, PumpExit::TimedOut);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
