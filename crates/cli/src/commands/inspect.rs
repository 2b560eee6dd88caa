//! Stack inspection command

use anyhow::Result;
use mend_lib::{InspectOptions, InspectionReport, Session, StackStateInspector};
use tabled::Tabled;

use crate::output::{
    color_status, format_age, print_json, print_rows, print_success, print_warning, OutputFormat,
};

/// Row for stacks table
#[derive(Tabled)]
struct StackRow {
    #[tabled(rename = "Stack")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Stuck")]
    stuck: String,
    #[tabled(rename = "Recommended")]
    action: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub async fn run(
    session: &Session,
    stack_name: Option<String>,
    treat_in_progress_as_stuck: bool,
    format: OutputFormat,
) -> Result<u8> {
    session.logger.log_run_start("inspect", false);

    let report = StackStateInspector::new(session)
        .inspect(&InspectOptions {
            stack_name,
            treat_in_progress_as_stuck,
        })
        .await;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => render(&report),
    }

    Ok(exit_code(&report))
}

fn render(report: &InspectionReport) {
    let rows: Vec<StackRow> = report
        .stacks
        .iter()
        .map(|s| StackRow {
            name: s.name.clone(),
            status: color_status(s.status.as_str()),
            age: format_age(s.age_minutes),
            stuck: if s.stuck {
                color_status("STUCK")
            } else {
                "no".to_string()
            },
            action: s.recommended_action.to_string(),
            reason: s.stuck_reason.clone().unwrap_or_default(),
        })
        .collect();
    print_rows(
        rows,
        &format!("No stacks found for environment {}", report.environment),
    );

    for error in &report.errors {
        print_warning(&format!("Could not inspect {}: {}", error.stack, error.message));
    }

    let stuck = report.stuck_count();
    if stuck == 0 {
        print_success(&format!("No stuck stacks in {}", report.environment));
    } else {
        print_warning(&format!("{} stuck stack(s) in {}", stuck, report.environment));
    }
}

/// 1 when any stack is stuck, 2 when some stacks could not be inspected
fn exit_code(report: &InspectionReport) -> u8 {
    if report.stuck_count() > 0 {
        1
    } else if !report.errors.is_empty() {
        2
    } else {
        0
    }
}
