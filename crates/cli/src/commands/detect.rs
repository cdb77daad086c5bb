//! Sample submission command

use anyhow::Result;
use clap::ValueEnum;
use tabled::Tabled;

use crate::client::{ApiClient, DetectRequest, DetectResponse, MetricInput};
use crate::output::{color_verdict, format_key, print_json, print_rows, print_warning, OutputFormat};

/// Metric kind accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl KindArg {
    fn wire_name(self) -> &'static str {
        match self {
            KindArg::Cpu => "CPU",
            KindArg::Memory => "MEMORY",
            KindArg::Disk => "DISK",
            KindArg::Network => "NETWORK",
        }
    }
}

#[derive(Tabled)]
struct VerdictRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Verdict")]
    verdict: String,
    #[tabled(rename = "Result")]
    result: i32,
}

/// Validate command-line fields into a wire metric
pub fn build_metric(
    entity: i64,
    kind: KindArg,
    value: Option<f64>,
    interface: Option<String>,
    received: Option<f64>,
    transmitted: Option<f64>,
) -> Result<MetricInput> {
    let mut metric = MetricInput {
        entity_id: entity,
        metric_type: kind.wire_name().to_string(),
        ..Default::default()
    };

    match kind {
        KindArg::Network => {
            let (Some(interface), Some(received), Some(transmitted)) =
                (interface, received, transmitted)
            else {
                anyhow::bail!("network samples need --interface, --received and --transmitted");
            };
            metric.interface = Some(interface);
            metric.received = Some(received);
            metric.transmitted = Some(transmitted);
        }
        _ => {
            let Some(value) = value else {
                anyhow::bail!("{} samples need --value", kind.wire_name().to_lowercase());
            };
            metric.value = Some(value);
        }
    }

    Ok(metric)
}

/// Submit one metric and print the resulting verdicts
pub async fn submit(client: &ApiClient, metric: MetricInput, format: OutputFormat) -> Result<()> {
    let request = DetectRequest {
        metrics: vec![metric],
    };
    let response: DetectResponse = client.post("v1/detect", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            for rejected in &response.rejected {
                print_warning(&format!("Rejected: {}", rejected.reason));
            }
            if response.predictions.is_empty() {
                return Ok(());
            }

            let rows = response
                .predictions
                .iter()
                .map(|p| VerdictRow {
                    key: format_key(p.entity_id, &p.metric_kind, p.sub_kind.as_deref()),
                    value: format!("{:.3}", p.value),
                    verdict: color_verdict(&verdict_label(&p.verdict)),
                    result: p.result,
                })
                .collect();
            print_rows(rows);
        }
    }

    Ok(())
}

/// `ANOMALY` -> `Anomaly`
fn verdict_label(verdict: &str) -> String {
    let lower = verdict.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_metric() {
        let metric = build_metric(4, KindArg::Cpu, Some(12.0), None, None, None).unwrap();
        assert_eq!(metric.metric_type, "CPU");
        assert_eq!(metric.value, Some(12.0));
        assert!(metric.interface.is_none());
    }

    #[test]
    fn test_scalar_metric_requires_value() {
        assert!(build_metric(4, KindArg::Disk, None, None, None, None).is_err());
    }

    #[test]
    fn test_network_metric_requires_all_fields() {
        let metric = build_metric(
            2,
            KindArg::Network,
            None,
            Some("eth0".to_string()),
            Some(10.0),
            Some(5.0),
        )
        .unwrap();
        assert_eq!(metric.metric_type, "NETWORK");
        assert_eq!(metric.transmitted, Some(5.0));

        assert!(build_metric(2, KindArg::Network, None, None, Some(10.0), Some(5.0)).is_err());
    }

    #[test]
    fn test_verdict_label() {
        assert_eq!(verdict_label("ANOMALY"), "Anomaly");
        assert_eq!(verdict_label("NORMAL"), "Normal");
        assert_eq!(verdict_label(""), "");
    }
}
