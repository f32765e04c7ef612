//! Container and host history commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ContainerStats, HostStats};
use crate::output::{color_pct, format_bytes, format_timestamp, print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct ContainerHistoryRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Mem %")]
    mem_pct: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Net RX")]
    net_rx: String,
    #[tabled(rename = "Net TX")]
    net_tx: String,
}

#[derive(Tabled)]
struct HostHistoryRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "CPU Temp")]
    cpu_temp: String,
    #[tabled(rename = "Load (1m)")]
    load: String,
    #[tabled(rename = "Disks")]
    disks: String,
}

/// Show samples for one container over the last `hours`, oldest first
pub async fn container_history(
    client: &ApiClient,
    name: &str,
    hours: f64,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/history/{}", name);
    let samples: Vec<ContainerStats> = client.get(&path, &[("hours", hours.to_string())]).await?;

    match format {
        OutputFormat::Json => print_json(&samples)?,
        OutputFormat::Table => {
            println!("{} {}", "History for".bold(), name.cyan());
            let rows: Vec<ContainerHistoryRow> = samples
                .iter()
                .map(|s| ContainerHistoryRow {
                    time: format_timestamp(&s.timestamp),
                    cpu: color_pct(s.cpu_pct, 80.0),
                    mem_pct: color_pct(s.mem_pct, 90.0),
                    memory: format_bytes(s.mem_usage),
                    net_rx: format_bytes(s.net_rx),
                    net_tx: format_bytes(s.net_tx),
                })
                .collect();
            print_rows(rows, "No samples in this period");
        }
    }

    Ok(())
}

/// Show host samples over the last `hours`, oldest first
pub async fn host_history(client: &ApiClient, hours: f64, format: OutputFormat) -> Result<()> {
    let samples: Vec<HostStats> = client
        .get("api/history/host", &[("hours", hours.to_string())])
        .await?;

    match format {
        OutputFormat::Json => print_json(&samples)?,
        OutputFormat::Table => {
            println!("{}", "Host history".bold());
            let rows: Vec<HostHistoryRow> = samples
                .iter()
                .map(|s| HostHistoryRow {
                    time: s.timestamp.as_deref().map(format_timestamp).unwrap_or_default(),
                    cpu_temp: s
                        .cpu_temp
                        .map(|t| format!("{:.1}°C", t))
                        .unwrap_or_else(|| "n/a".to_string()),
                    load: format!("{:.2}", s.load_avg[0]),
                    disks: s
                        .disk
                        .iter()
                        .map(|d| format!("{} {:.1}%", d.mount, d.pct))
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            print_rows(rows, "No samples in this period");
        }
    }

    Ok(())
}
