//! Deployment monitor command

use anyhow::Result;
use mend_lib::{DeploymentMonitor, DeploymentStatus, OverallStatus, Session};
use std::time::Duration;
use tabled::Tabled;
use tracing::warn;

use crate::output::{
    color_status, format_age, print_info, print_json, print_rows, print_success, print_warning,
    OutputFormat,
};

/// Row for services table
#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Running")]
    running: String,
    #[tabled(rename = "Deployments")]
    deployments: usize,
}

/// Row for stacks table
#[derive(Tabled)]
struct StackRow {
    #[tabled(rename = "Stack")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Age")]
    age: String,
}

pub async fn run(
    session: &Session,
    continuous: bool,
    interval: Option<u64>,
    duration: Option<u64>,
    format: OutputFormat,
) -> Result<u8> {
    session.logger.log_run_start("monitor", false);
    let mut monitor = DeploymentMonitor::new(session);

    let status = if continuous {
        let interval = interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| session.config.monitor_interval());
        let duration = duration
            .map(Duration::from_secs)
            .unwrap_or_else(|| session.config.monitor_duration());

        monitor
            .run(interval, duration, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for interrupt");
                    std::future::pending::<()>().await;
                }
            })
            .await
    } else {
        monitor.status().await
    };

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => render(&status),
    }

    Ok(status.exit_code() as u8)
}

fn render(status: &DeploymentStatus) {
    let stacks: Vec<StackRow> = status
        .stacks
        .iter()
        .map(|s| StackRow {
            name: s.name.clone(),
            status: color_status(s.status.as_str()),
            age: format_age(s.age_minutes),
        })
        .collect();
    print_rows(stacks, "No stacks found");

    let services: Vec<ServiceRow> = status
        .services
        .iter()
        .map(|s| ServiceRow {
            name: s.name.clone(),
            status: s.status.clone(),
            running: format!("{}/{}", s.running_count, s.desired_count),
            deployments: s.deployments.len(),
        })
        .collect();
    print_rows(services, "No services found");

    for event in &status.new_events {
        print_warning(&format!(
            "{} {}: {}",
            event.logical_id,
            event.status,
            event.reason.as_deref().unwrap_or("no reason reported")
        ));
    }
    for error in &status.errors {
        print_warning(error);
    }
    for recommendation in &status.recommendations {
        print_info(recommendation);
    }

    let label = color_status(&status.overall_status.to_string());
    match status.overall_status {
        OverallStatus::Healthy => print_success(&format!("Overall status: {label}")),
        _ => print_warning(&format!("Overall status: {label}")),
    }
}
