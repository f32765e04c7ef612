//! Current snapshot and daemon health commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{Alert, ApiClient, ApiHealth, ContainerStats, Current, HostStats, ImageStats};
use crate::output::{
    color_alert_kind, color_pct, color_status, format_bytes, format_timestamp, print_info,
    print_json, print_rows, print_success, print_warning, OutputFormat,
};

/// Row for the containers table
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Mem %")]
    mem_pct: String,
    #[tabled(rename = "Net RX")]
    net_rx: String,
    #[tabled(rename = "Net TX")]
    net_tx: String,
    #[tabled(rename = "Restarts")]
    restarts: u64,
}

impl From<&ContainerStats> for ContainerRow {
    fn from(c: &ContainerStats) -> Self {
        Self {
            name: c.name.clone(),
            status: color_status(&c.status),
            cpu: color_pct(c.cpu_pct, 80.0),
            memory: format!("{} / {}", format_bytes(c.mem_usage), format_bytes(c.mem_limit)),
            mem_pct: color_pct(c.mem_pct, 90.0),
            net_rx: format_bytes(c.net_rx),
            net_tx: format_bytes(c.net_tx),
            restarts: c.restart_count,
        }
    }
}

/// Row for the disk table
#[derive(Tabled)]
struct DiskRow {
    #[tabled(rename = "Mount")]
    mount: String,
    #[tabled(rename = "Used")]
    used: String,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Usage")]
    pct: String,
}

/// Row for the active anomalies table
#[derive(Tabled)]
pub(crate) struct AlertRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&Alert> for AlertRow {
    fn from(a: &Alert) -> Self {
        Self {
            time: format_timestamp(&a.timestamp),
            kind: color_alert_kind(&a.kind),
            target: a.target.clone(),
            value: format!("{:.1}", a.value),
            message: a.message.clone(),
        }
    }
}

/// Show the latest containers, host sample and active anomalies
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let current: Current = client.get("api/current", &[]).await?;

    if let OutputFormat::Json = format {
        return print_json(&current);
    }

    let Some(ts) = &current.ts else {
        print_info("No collection cycle has completed yet");
        return Ok(());
    };

    println!("{}", "Docker Monitor Status".bold());
    println!("{}", "=".repeat(60));
    println!("Snapshot: {}", format_timestamp(ts).cyan());
    println!();

    println!("{}", "Containers".bold());
    print_rows(
        current.containers.iter().map(ContainerRow::from).collect(),
        "No running containers",
    );
    println!();

    print_host(&current.host);
    println!();

    if let Some(images) = &current.images {
        print_images(images);
        println!();
    }

    println!("{}", "Active Anomalies".bold());
    if current.anomalies.is_empty() {
        print_success("No anomalies in the last cycle");
    } else {
        print_rows(
            current.anomalies.iter().map(AlertRow::from).collect(),
            "No anomalies in the last cycle",
        );
    }

    Ok(())
}

fn print_host(host: &HostStats) {
    println!("{}", "Host".bold());
    match host.cpu_temp {
        Some(t) => println!("CPU temp:  {:.1}°C", t),
        None => println!("CPU temp:  {}", "n/a".dimmed()),
    }
    if let Some(t) = host.gpu_temp {
        println!("GPU temp:  {:.1}°C", t);
    }
    println!(
        "Load avg:  {:.2} {:.2} {:.2}",
        host.load_avg[0], host.load_avg[1], host.load_avg[2]
    );

    let rows: Vec<DiskRow> = host
        .disk
        .iter()
        .map(|d| DiskRow {
            mount: d.mount.clone(),
            used: format_bytes(d.used),
            total: format_bytes(d.total),
            pct: color_pct(d.pct, 90.0),
        })
        .collect();
    print_rows(rows, "No disk usage reported");
}

fn print_images(images: &ImageStats) {
    println!("{}", "Docker Disk Usage".bold());
    println!(
        "Images:     {} ({})",
        images.image_count,
        format_bytes(images.image_size)
    );
    println!(
        "Volumes:    {} ({})",
        images.volume_count,
        format_bytes(images.volume_size)
    );
    println!("Containers: {}", format_bytes(images.container_rw_size));
    println!("Build cache: {}", format_bytes(images.cache_size));
}

/// Show daemon liveness from the unauthenticated health endpoint
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: ApiHealth = client.get("api/health", &[]).await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("Status:     {}", color_status(&health.status));
            match &health.last_cycle {
                Some(ts) => println!("Last cycle: {}", format_timestamp(ts)),
                None => print_warning("No collection cycle has completed yet"),
            }
        }
    }

    Ok(())
}
