//! Stack state inspection
//!
//! Finds the stacks that belong to an environment, describes each one and
//! tags it stuck or not stuck from its status and time in state. A failure
//! to describe one stack is recorded and never stops the others.

use crate::config::EngineConfig;
use crate::error::{BackendError, ErrorKind};
use crate::models::{RecommendedAction, StackRecord, StackSnapshot, StackStatus};
use crate::session::Session;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Inspection options
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// Inspect only this stack
    pub stack_name: Option<String>,
    /// Treat every in-progress stack as stuck regardless of age
    pub treat_in_progress_as_stuck: bool,
}

/// A stack that could not be inspected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionError {
    pub stack: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl InspectionError {
    fn from_backend(stack: &str, err: &BackendError) -> Self {
        Self {
            stack: stack.to_string(),
            kind: err.kind,
            message: err.to_string(),
        }
    }
}

/// Aggregate result of one inspection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionReport {
    pub environment: String,
    pub inspected_at: DateTime<Utc>,
    pub stacks: Vec<StackSnapshot>,
    pub errors: Vec<InspectionError>,
}

impl InspectionReport {
    pub fn stuck(&self) -> impl Iterator<Item = &StackSnapshot> {
        self.stacks.iter().filter(|s| s.stuck)
    }

    pub fn stuck_count(&self) -> usize {
        self.stuck().count()
    }
}

/// Queries the provisioning backend and classifies stacks
pub struct StackStateInspector<'a> {
    session: &'a Session,
}

impl<'a> StackStateInspector<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Inspect all stacks of the session's environment, or only the named one
    pub async fn inspect(&self, options: &InspectOptions) -> InspectionReport {
        let mut report = InspectionReport {
            environment: self.session.environment.clone(),
            inspected_at: Utc::now(),
            stacks: Vec::new(),
            errors: Vec::new(),
        };

        let names = match &options.stack_name {
            Some(name) => vec![name.clone()],
            None => match self.session.backends.stacks.list_stacks().await {
                Ok(records) => records
                    .into_iter()
                    .map(|r| r.name)
                    .filter(|name| self.session.owns_stack(name))
                    .collect(),
                Err(e) => {
                    report.errors.push(InspectionError::from_backend("*", &e));
                    return report;
                }
            },
        };

        debug!(count = names.len(), "Describing environment stacks");

        let stacks = &self.session.backends.stacks;
        let results = join_all(names.iter().map(|name| stacks.describe_stack(name))).await;

        let now = Utc::now();
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(record) => {
                    let snapshot = classify_stack(
                        record,
                        now,
                        &self.session.config,
                        options.treat_in_progress_as_stuck,
                    );
                    if snapshot.stuck {
                        self.session.logger.log_stuck_stack(&snapshot);
                    }
                    report.stacks.push(snapshot);
                }
                Err(e) if e.is_not_found() => {
                    info!(stack = %name, "Stack not found, skipping");
                }
                Err(e) => {
                    report.errors.push(InspectionError::from_backend(name, &e));
                }
            }
        }

        report.inspected_at = now;
        report
    }
}

/// In-progress age threshold for a status, in minutes
pub fn stuck_threshold_mins(status: StackStatus, config: &EngineConfig) -> i64 {
    match status {
        StackStatus::DeleteInProgress => config.delete_threshold_mins,
        s if s.is_cleanup_in_progress() => config.cleanup_threshold_mins,
        _ => config.in_progress_threshold_mins,
    }
}

/// Classify one stack record as of `now`
pub fn classify_stack(
    record: StackRecord,
    now: DateTime<Utc>,
    config: &EngineConfig,
    treat_in_progress_as_stuck: bool,
) -> StackSnapshot {
    let age_minutes = (now - record.last_transition_time).num_minutes().max(0);
    let status = record.status;

    let stuck_reason = if status.is_failed() {
        Some(format!("terminal failure state {status}"))
    } else if status.is_in_progress() {
        let threshold = stuck_threshold_mins(status, config);
        if treat_in_progress_as_stuck {
            Some(format!("{status} treated as stuck on request"))
        } else if age_minutes > threshold {
            Some(format!(
                "{status} for {age_minutes} minutes (threshold {threshold})"
            ))
        } else {
            None
        }
    } else {
        None
    };

    let stuck = stuck_reason.is_some();
    StackSnapshot {
        name: record.name,
        stack_id: record.stack_id,
        status,
        last_transition_time: record.last_transition_time,
        age_minutes,
        stuck,
        stuck_reason,
        recommended_action: if stuck {
            RecommendedAction::for_status(status)
        } else {
            RecommendedAction::None
        },
        status_reason: record.status_reason,
    }
}
