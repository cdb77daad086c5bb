//! Key routing
//!
//! Maps inbound metric records onto the series keys they feed. CPU, memory
//! and disk readings map to one key each; a network reading maps to two
//! keys (received and transmitted) sharing the entity and interface, since
//! the two directions are modelled as independent series.

use crate::error::{DetectorError, Result};
use crate::models::{MetricKind, RawMetric, Sample, SampleKey};
use chrono::{DateTime, Utc};

/// Inbound metric family, before network fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl InboundKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "CPU" => Some(InboundKind::Cpu),
            "MEMORY" => Some(InboundKind::Memory),
            "DISK" => Some(InboundKind::Disk),
            "NETWORK" => Some(InboundKind::Network),
            _ => None,
        }
    }
}

/// Route a raw record to the samples it produces
///
/// Pure: no state is touched, so a rejected record leaves the engine as it
/// was. `now` stamps records that carry no timestamp of their own.
pub fn route(raw: &RawMetric, now: DateTime<Utc>) -> Result<Vec<Sample>> {
    let entity_id = raw
        .entity_id
        .ok_or_else(|| DetectorError::malformed("missing entity_id"))?;
    let metric_type = raw
        .metric_type
        .as_deref()
        .ok_or_else(|| DetectorError::malformed("missing metric_type"))?;
    let kind = InboundKind::parse(metric_type)
        .ok_or_else(|| DetectorError::malformed(format!("unknown metric kind '{}'", metric_type)))?;
    let timestamp = raw.timestamp.unwrap_or(now);

    let scalar = |metric_kind: MetricKind| -> Result<Vec<Sample>> {
        let value = finite(raw.value, "value")?;
        Ok(vec![Sample::new(
            SampleKey::new(entity_id, metric_kind),
            timestamp,
            value,
        )])
    };

    match kind {
        InboundKind::Cpu => scalar(MetricKind::Cpu),
        InboundKind::Memory => scalar(MetricKind::Memory),
        InboundKind::Disk => scalar(MetricKind::Disk),
        InboundKind::Network => {
            let interface = raw
                .interface
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| DetectorError::malformed("NETWORK record missing interface"))?;
            let received = finite(raw.received, "received")?;
            let transmitted = finite(raw.transmitted, "transmitted")?;

            Ok(vec![
                Sample::new(
                    SampleKey::with_sub_kind(entity_id, MetricKind::NetworkReceived, interface),
                    timestamp,
                    received,
                ),
                Sample::new(
                    SampleKey::with_sub_kind(entity_id, MetricKind::NetworkTransmitted, interface),
                    timestamp,
                    transmitted,
                ),
            ])
        }
    }
}

fn finite(value: Option<f64>, field: &str) -> Result<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(_) => Err(DetectorError::malformed(format!("{} is not finite", field))),
        None => Err(DetectorError::malformed(format!("missing {}", field))),
    }
}
