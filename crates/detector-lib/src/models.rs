//! Core data models for the anomaly detector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Resource dimension a time series tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    NetworkReceived,
    NetworkTransmitted,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPU",
            MetricKind::Memory => "MEMORY",
            MetricKind::Disk => "DISK",
            MetricKind::NetworkReceived => "NETWORK_RECEIVED",
            MetricKind::NetworkTransmitted => "NETWORK_TRANSMITTED",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one time series and its model slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleKey {
    pub entity_id: i64,
    pub metric_kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_kind: Option<String>,
}

impl SampleKey {
    pub fn new(entity_id: i64, metric_kind: MetricKind) -> Self {
        Self {
            entity_id,
            metric_kind,
            sub_kind: None,
        }
    }

    pub fn with_sub_kind(entity_id: i64, metric_kind: MetricKind, sub_kind: impl Into<String>) -> Self {
        Self {
            entity_id,
            metric_kind,
            sub_kind: Some(sub_kind.into()),
        }
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_kind {
            Some(sub) => write!(f, "{}/{}/{}", self.entity_id, self.metric_kind, sub),
            None => write!(f, "{}/{}", self.entity_id, self.metric_kind),
        }
    }
}

/// One observed value for a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub key: SampleKey,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(key: SampleKey, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            key,
            timestamp,
            value,
        }
    }
}

/// Inbound metric record as submitted by collectors
///
/// Every field is optional on the wire so that a single bad record can be
/// rejected without failing the whole batch. `metric_type` is one of
/// `CPU`, `MEMORY`, `DISK` or `NETWORK` (case-insensitive).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetric {
    #[serde(default, alias = "pid")]
    pub entity_id: Option<i64>,
    #[serde(default, alias = "metrictype")]
    pub metric_type: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    /// Interface name, NETWORK only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmitted: Option<f64>,
    /// Sample time; the ingestion time is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawMetric {
    pub fn scalar(entity_id: i64, metric_type: &str, value: f64) -> Self {
        Self {
            entity_id: Some(entity_id),
            metric_type: Some(metric_type.to_string()),
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn network(entity_id: i64, interface: &str, received: f64, transmitted: f64) -> Self {
        Self {
            entity_id: Some(entity_id),
            metric_type: Some("NETWORK".to_string()),
            interface: Some(interface.to_string()),
            received: Some(received),
            transmitted: Some(transmitted),
            ..Default::default()
        }
    }
}

/// Classification of one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Normal,
    Anomaly,
    /// No trained model yet for the key
    Unknown,
}

impl Verdict {
    /// Numeric result code used on the wire (1 normal, -1 anomaly, 0 unknown)
    pub fn code(&self) -> i32 {
        match self {
            Verdict::Normal => 1,
            Verdict::Anomaly => -1,
            Verdict::Unknown => 0,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Verdict::Normal => "Normal",
            Verdict::Anomaly => "Anomaly",
            Verdict::Unknown => "Unknown",
        }
    }

    pub fn is_anomaly(&self) -> bool {
        matches!(self, Verdict::Anomaly)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status())
    }
}

/// Result of scoring one value against a key's current model
///
/// The numeric `result` code is derived from the verdict when serialized.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Prediction {
    #[serde(flatten)]
    pub key: SampleKey,
    pub value: f64,
    pub verdict: Verdict,
}

impl Prediction {
    pub fn new(key: SampleKey, value: f64, verdict: Verdict) -> Self {
        Self {
            key,
            value,
            verdict,
        }
    }

    pub fn result(&self) -> i32 {
        self.verdict.code()
    }
}

#[derive(Serialize)]
struct WirePrediction<'a> {
    #[serde(flatten)]
    key: &'a SampleKey,
    value: f64,
    verdict: Verdict,
    result: i32,
}

impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WirePrediction {
            key: &self.key,
            value: self.value,
            verdict: self.verdict,
            result: self.result(),
        }
        .serialize(serializer)
    }
}

/// Transport-ready record kept in the distribution history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    /// Publish order, assigned by the hub
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub sample: Sample,
    pub prediction: Prediction,
}

impl HistoryRecord {
    /// Build an unpublished record; the hub assigns `seq`
    pub fn new(sample: Sample, prediction: Prediction) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            sample,
            prediction,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Flat wire shape for dashboards
#[derive(Serialize)]
struct WireRecord<'a> {
    seq: u64,
    timestamp: &'a DateTime<Utc>,
    entity_id: i64,
    metric_kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub_kind: Option<&'a str>,
    value: f64,
    sampled_at: &'a DateTime<Utc>,
    verdict: Verdict,
    result: i32,
    status: &'static str,
}

impl Serialize for HistoryRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let key = &self.prediction.key;
        WireRecord {
            seq: self.seq,
            timestamp: &self.timestamp,
            entity_id: key.entity_id,
            metric_kind: key.metric_kind,
            sub_kind: key.sub_kind.as_deref(),
            value: self.sample.value,
            sampled_at: &self.sample.timestamp,
            verdict: self.prediction.verdict,
            result: self.prediction.verdict.code(),
            status: self.prediction.verdict.status(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_codes_match_wire_protocol() {
        assert_eq!(Verdict::Normal.code(), 1);
        assert_eq!(Verdict::Anomaly.code(), -1);
        assert_eq!(Verdict::Unknown.code(), 0);
    }

    #[test]
    fn test_raw_metric_accepts_pid_alias() {
        let raw: RawMetric =
            serde_json::from_str(r#"{"pid": 123, "metric_type": "CPU", "value": 75.5}"#).unwrap();
        assert_eq!(raw.entity_id, Some(123));
        assert_eq!(raw.metric_type.as_deref(), Some("CPU"));
        assert_eq!(raw.value, Some(75.5));
    }

    #[test]
    fn test_history_record_serializes_flat() {
        let key = SampleKey::with_sub_kind(2, MetricKind::NetworkReceived, "eth0");
        let sample = Sample::new(key.clone(), Utc::now(), 42.0);
        let mut record = HistoryRecord::new(sample, Prediction::new(key, 42.0, Verdict::Anomaly));
        record.seq = 7;

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["entity_id"], 2);
        assert_eq!(json["metric_kind"], "NETWORK_RECEIVED");
        assert_eq!(json["sub_kind"], "eth0");
        assert_eq!(json["value"], 42.0);
        assert_eq!(json["verdict"], "ANOMALY");
        assert_eq!(json["result"], -1);
        assert_eq!(json["status"], "Anomaly");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_scalar_key_omits_sub_kind() {
        let key = SampleKey::new(1, MetricKind::Cpu);
        let sample = Sample::new(key.clone(), Utc::now(), 1.0);
        let record = HistoryRecord::new(sample, Prediction::new(key, 1.0, Verdict::Unknown));

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert!(json.get("sub_kind").is_none());
        assert_eq!(json["result"], 0);
    }

    #[test]
    fn test_prediction_result_follows_verdict() {
        let mut prediction = Prediction::new(SampleKey::new(4, MetricKind::Disk), 3.0, Verdict::Normal);
        prediction.verdict = Verdict::Anomaly;
        assert_eq!(prediction.result(), -1);

        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["entity_id"], 4);
        assert_eq!(json["verdict"], "ANOMALY");
        assert_eq!(json["result"], -1);

        let back: Prediction = serde_json::from_value(json).unwrap();
        assert_eq!(back, prediction);
    }

    #[test]
    fn test_sample_key_display() {
        assert_eq!(SampleKey::new(1, MetricKind::Cpu).to_string(), "1/CPU");
        assert_eq!(
            SampleKey::with_sub_kind(2, MetricKind::NetworkTransmitted, "eth0").to_string(),
            "2/NETWORK_TRANSMITTED/eth0"
        );
    }
}
