//! Service health command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, Health, Readiness};
use crate::output::{color_status, print_json, render_table, OutputFormat};

/// Row for the component table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show component health and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (u16, Health) = client.probe("healthz").await?;
    let (_, readiness): (u16, Readiness) = client.probe("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(50));
            println!("Overall:                {}", color_status(&health.status));
            let ready = if readiness.ready { "ready" } else { "not_ready" };
            match &readiness.reason {
                Some(reason) => println!("Readiness:              {} ({})", color_status(ready), reason),
                None => println!("Readiness:              {}", color_status(ready)),
            }
            if let Some(version) = &readiness.model_version {
                println!("Model version:          {}", version.cyan());
            }
            println!();

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            println!("{}", render_table(rows, "No components registered"));
        }
    }

    Ok(())
}
