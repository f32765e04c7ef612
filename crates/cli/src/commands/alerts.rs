//! Alert history command

use anyhow::Result;
use colored::Colorize;

use super::status::AlertRow;
use crate::client::{Alert, ApiClient};
use crate::output::{print_json, print_rows, OutputFormat};

/// List alerts raised within the last `hours`, newest first
pub async fn list_alerts(client: &ApiClient, hours: f64, format: OutputFormat) -> Result<()> {
    let alerts: Vec<Alert> = client
        .get("api/alerts", &[("hours", hours.to_string())])
        .await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            println!("{}", format!("Alerts (last {}h)", hours).bold());
            let count = alerts.len();
            print_rows(
                alerts.iter().map(AlertRow::from).collect(),
                "No alerts in this period",
            );
            if count > 0 {
                println!("\nTotal: {} alerts", count);
            }
        }
    }

    Ok(())
}
