//! Stuck stack fix command

use anyhow::Result;
use mend_lib::continuation::ContinuationOptions;
use mend_lib::{FixOptions, FixReport, Session, StuckStackFixer};
use tabled::Tabled;

use crate::output::{
    color_status, print_info, print_json, print_rows, print_success, print_warning, OutputFormat,
};

/// Row for remediation results table
#[derive(Tabled)]
struct RemediationRow {
    #[tabled(rename = "Stack")]
    stack: String,
    #[tabled(rename = "Resource")]
    logical_id: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub fn options(
    stack_name: Option<String>,
    dry_run: bool,
    force_delete: bool,
    delete_in_progress: bool,
    skip_unfixable: bool,
) -> FixOptions {
    FixOptions {
        stack_name,
        dry_run,
        continuation: ContinuationOptions {
            skip_unfixable,
            delete_in_progress,
            force_delete,
        },
    }
}

pub async fn run(session: &Session, options: &FixOptions, format: OutputFormat) -> Result<u8> {
    let report = StuckStackFixer::new(session).run(options).await;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => render(&report),
    }

    Ok(report.exit_code() as u8)
}

fn render(report: &FixReport) {
    if report.dry_run {
        print_info("Dry run: no changes will be made");
    }

    let rows: Vec<RemediationRow> = report
        .stacks
        .iter()
        .flat_map(|stack| {
            stack.remediations.iter().map(move |r| RemediationRow {
                stack: stack.stack.name.clone(),
                logical_id: r.resource.logical_id.clone(),
                resource_type: r.resource.resource_type.clone(),
                result: color_status(if r.fixed {
                    "FIXED"
                } else if r.unfixable {
                    "UNFIXABLE"
                } else if report.dry_run {
                    "DRY RUN"
                } else {
                    "FAILED"
                }),
                reason: r.reason.clone(),
            })
        })
        .collect();
    print_rows(rows, "No stuck resources found");

    for stack in &report.stacks {
        if let Some(error) = &stack.error {
            print_warning(&format!("{}: could not read events: {}", stack.stack.name, error));
        }
        let continuation = &stack.continuation;
        if !continuation.skip_list.is_empty() {
            print_info(&format!(
                "{}: skipping {}",
                stack.stack.name,
                continuation.skip_list.join(", ")
            ));
        }
        for step in &continuation.steps {
            let line = format!("{}: {} - {}", stack.stack.name, step.action, step.detail);
            if step.succeeded {
                print_success(&line);
            } else {
                print_warning(&line);
            }
        }
        if let Some(note) = &continuation.note {
            print_info(&format!("{}: {}", stack.stack.name, note));
        }
    }

    for error in &report.errors {
        print_warning(&format!("Could not inspect {}: {}", error.stack, error.message));
    }

    if report.stacks.is_empty() {
        print_success(&format!("No stuck stacks in {}", report.environment));
    } else if !report.dry_run && report.unresolved_count() == 0 {
        print_success(&format!("All {} stuck stack(s) unblocked", report.stacks.len()));
    } else if !report.dry_run {
        print_warning(&format!(
            "{} stack(s) still need attention",
            report.unresolved_count()
        ));
    }
}
