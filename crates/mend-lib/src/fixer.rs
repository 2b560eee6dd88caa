//! Stuck stack fixer
//!
//! Runs the full pipeline for every stuck stack of an environment:
//! inspect, classify the resource events, remediate the blocking resources
//! in priority order and finally continue, cancel or delete the stack.
//! Stacks are handled concurrently; each stack gets exactly one pass.

use crate::classifier::{classify, ClassifierThresholds};
use crate::continuation::{ContinuationOptions, ContinuationOutcome, RollbackContinuation};
use crate::inspector::{InspectOptions, InspectionError, StackStateInspector};
use crate::models::{RemediationResult, StackSnapshot, StuckResource};
use crate::remediation::RemediationDispatcher;
use crate::session::Session;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Options for a fix run
#[derive(Debug, Clone, Default)]
pub struct FixOptions {
    pub stack_name: Option<String>,
    pub dry_run: bool,
    pub continuation: ContinuationOptions,
}

/// Result of fixing one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackFixReport {
    pub stack: StackSnapshot,
    pub stuck_resources: Vec<StuckResource>,
    pub remediations: Vec<RemediationResult>,
    pub continuation: ContinuationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StackFixReport {
    pub fn resolved(&self) -> bool {
        self.continuation.succeeded
    }
}

/// Aggregate result of a fix run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixReport {
    pub environment: String,
    pub dry_run: bool,
    pub inspected_at: DateTime<Utc>,
    pub stacks: Vec<StackFixReport>,
    pub errors: Vec<InspectionError>,
}

impl FixReport {
    pub fn unresolved_count(&self) -> usize {
        self.stacks.iter().filter(|s| !s.resolved()).count()
    }

    /// 0 when nothing is left to do, 1 when a stuck stack remains
    /// unresolved, 2 for dry runs that found work or partial inspection
    pub fn exit_code(&self) -> i32 {
        if self.dry_run {
            return if self.stacks.is_empty() && self.errors.is_empty() { 0 } else { 2 };
        }
        if self.unresolved_count() > 0 {
            1
        } else if !self.errors.is_empty() {
            2
        } else {
            0
        }
    }
}

pub struct StuckStackFixer<'a> {
    session: &'a Session,
}

impl<'a> StuckStackFixer<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub async fn run(&self, options: &FixOptions) -> FixReport {
        self.session.logger.log_run_start("fix", options.dry_run);

        let report = StackStateInspector::new(self.session)
            .inspect(&InspectOptions {
                stack_name: options.stack_name.clone(),
                treat_in_progress_as_stuck: options.continuation.delete_in_progress,
            })
            .await;

        let stuck: Vec<&StackSnapshot> = report.stuck().collect();
        info!(
            stuck = stuck.len(),
            inspected = report.stacks.len(),
            dry_run = options.dry_run,
            "Fixing stuck stacks"
        );

        let stacks = join_all(stuck.into_iter().map(|stack| self.fix_stack(stack, options))).await;

        FixReport {
            environment: report.environment,
            dry_run: options.dry_run,
            inspected_at: report.inspected_at,
            stacks,
            errors: report.errors,
        }
    }

    /// One inspect -> classify -> remediate -> continue pass for a stack
    pub async fn fix_stack(&self, stack: &StackSnapshot, options: &FixOptions) -> StackFixReport {
        let mut error = None;

        let stuck_resources = match self
            .session
            .backends
            .stacks
            .describe_stack_events(&stack.name)
            .await
        {
            Ok(events) => classify(
                &events,
                Utc::now(),
                ClassifierThresholds::from(&self.session.config),
            ),
            Err(e) => {
                warn!(stack = %stack.name, error = %e, "Failed to read stack events");
                error = Some(e.to_string());
                Vec::new()
            }
        };

        let remediations = RemediationDispatcher::new(self.session, options.dry_run)
            .remediate_all(&stack.name, &stuck_resources)
            .await;

        let continuation = RollbackContinuation::new(self.session, options.dry_run)
            .run(stack, &remediations, &options.continuation)
            .await;

        StackFixReport {
            stack: stack.clone(),
            stuck_resources,
            remediations,
            continuation,
            error,
        }
    }
}
