//! Pre-deployment health gate command

use anyhow::Result;
use mend_lib::{DeploymentHealthGate, GateOptions, HealthVerdict, Session};
use tabled::Tabled;

use crate::output::{
    color_status, print_info, print_json, print_rows, print_success, print_warning, OutputFormat,
};

/// Row for issues table
#[derive(Tabled)]
struct IssueRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Issue")]
    message: String,
}

pub async fn run(session: &Session, options: GateOptions, format: OutputFormat) -> Result<u8> {
    let verdict = DeploymentHealthGate::new(session).check(&options).await;

    match format {
        OutputFormat::Json => print_json(&verdict)?,
        OutputFormat::Table => render(&verdict),
    }

    Ok(verdict.exit_code() as u8)
}

fn render(verdict: &HealthVerdict) {
    let rows: Vec<IssueRow> = verdict
        .issues
        .iter()
        .map(|issue| {
            let severity = format!("{:?}", issue.severity).to_uppercase();
            IssueRow {
                severity: color_status(&severity),
                subject: format!("{:?}", issue.subject).to_lowercase(),
                name: issue.name.clone(),
                message: issue.message.clone(),
            }
        })
        .collect();
    print_rows(rows, &format!("No issues found in {}", verdict.environment));

    for action in &verdict.actions {
        print_info(action);
    }

    if verdict.can_proceed && verdict.healthy {
        print_success("Deployment may proceed");
    } else if verdict.can_proceed {
        print_warning(&format!(
            "Deployment may proceed with {} warning(s)",
            verdict.warning_count()
        ));
    } else {
        print_warning(&format!(
            "Deployment blocked by {} critical issue(s)",
            verdict.critical_count()
        ));
    }
}
