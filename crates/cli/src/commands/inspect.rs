//! Read-only inspection commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, HistoryResponse, ModelsResponse, ReadinessResponse};
use crate::output::{
    color_status, color_verdict, format_key, format_timestamp, print_info, print_json, print_rows,
    print_warning, OutputFormat,
};

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Seq")]
    seq: u64,
    #[tabled(rename = "Sampled At")]
    sampled_at: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Samples")]
    series_length: u64,
    #[tabled(rename = "Retained")]
    retained: usize,
    #[tabled(rename = "Trained At")]
    trained_at: String,
    #[tabled(rename = "Last Failure")]
    last_failure: String,
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Since")]
    since: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show the detector's recent prediction history
pub async fn show_history(
    client: &ApiClient,
    limit: Option<usize>,
    anomalies_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut history: HistoryResponse = client.get("v1/history").await?;

    if anomalies_only {
        history.records.retain(|r| r.result == -1);
    }
    if let Some(limit) = limit {
        let skip = history.records.len().saturating_sub(limit);
        history.records.drain(..skip);
    }

    match format {
        OutputFormat::Json => print_json(&history)?,
        OutputFormat::Table => {
            if history.records.is_empty() {
                print_warning("No predictions recorded yet");
                return Ok(());
            }

            let shown = history.records.len();
            let rows = history
                .records
                .into_iter()
                .map(|r| HistoryRow {
                    seq: r.seq,
                    sampled_at: format_timestamp(&r.sampled_at),
                    key: format_key(r.entity_id, &r.metric_kind, r.sub_kind.as_deref()),
                    value: format!("{:.3}", r.value),
                    status: color_verdict(&r.status),
                })
                .collect();
            print_rows(rows);
            println!(
                "\nShowing {} of {} retained ({} published, {} dropped deliveries)",
                shown, history.stats.history_len, history.stats.published, history.stats.dropped
            );
        }
    }

    Ok(())
}

/// Show per-key series length and model state
pub async fn show_models(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let models: ModelsResponse = client.get("v1/models").await?;

    match format {
        OutputFormat::Json => print_json(&models)?,
        OutputFormat::Table => {
            print_info(&format!(
                "Trainer: {}, retrain every {} samples",
                models.trainer.cyan(),
                models.retrain_interval
            ));

            if models.keys.is_empty() {
                print_warning("No series observed yet");
                return Ok(());
            }

            let rows = models
                .keys
                .iter()
                .map(|k| ModelRow {
                    key: format_key(k.entity_id, &k.metric_kind, k.sub_kind.as_deref()),
                    series_length: k.series_length,
                    retained: k.retained,
                    trained_at: if k.has_model {
                        k.trained_at_sample_count.to_string()
                    } else {
                        "cold".dimmed().to_string()
                    },
                    last_failure: k
                        .last_failure
                        .as_deref()
                        .map(|f| f.red().to_string())
                        .unwrap_or_default(),
                })
                .collect();
            print_rows(rows);
        }
    }

    Ok(())
}

/// Show health components and readiness
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (_, HealthResponse) = client.get_with_status("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get_with_status("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            println!("{}", "Detector Status".bold());
            println!("{}", "=".repeat(50));
            println!("Overall:  {}", color_status(&health.status));
            let ready = if readiness.ready {
                "yes".green().to_string()
            } else {
                "no".red().to_string()
            };
            println!("Ready:    {}", ready);
            if let Some(reason) = &readiness.reason {
                println!("Reason:   {}", reason);
            }
            println!();

            let rows = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    since: c.since.as_deref().map(format_timestamp).unwrap_or_default(),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            print_rows(rows);
        }
    }

    Ok(())
}
