//! Rollback continuation
//!
//! Decides from a stuck stack's status which stack-level operation gets it
//! moving again:
//!
//! | Status                              | Action                               |
//! |-------------------------------------|--------------------------------------|
//! | rollback in progress / failed       | continue rollback (optional skips)   |
//! | cleanup in progress                 | cancel, rejection is informational   |
//! | update in progress                  | cancel                               |
//! | delete failed                       | delete again                         |
//! | create/update in progress, override | cancel (tolerated), then delete      |
//! | anything, force override            | delete when nothing else succeeded   |
//!
//! A "nothing to do" answer from the backend counts as success.

use crate::models::{RemediationResult, ResourceKind, StackSnapshot, StackStatus};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Caller overrides for the decision table
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuationOptions {
    /// Pass unfixable resources as a skip-list when continuing a rollback
    pub skip_unfixable: bool,
    /// Cancel and delete stacks stuck creating or updating
    pub delete_in_progress: bool,
    /// Delete the stack when no other action succeeded
    pub force_delete: bool,
}

/// A stack-level operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationAction {
    ContinueRollback,
    CancelUpdate,
    DeleteStack,
}

impl fmt::Display for ContinuationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContinuationAction::ContinueRollback => "continue-rollback",
            ContinuationAction::CancelUpdate => "cancel-update",
            ContinuationAction::DeleteStack => "delete-stack",
        };
        f.write_str(label)
    }
}

/// One issued (or simulated) operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationStep {
    pub action: ContinuationAction,
    pub succeeded: bool,
    pub detail: String,
}

/// Everything the continuation did for one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationOutcome {
    pub stack: String,
    pub status: StackStatus,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub skip_list: Vec<String>,
    pub steps: Vec<ContinuationStep>,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Primary actions for a status, before any force-delete fallback
pub fn plan(status: StackStatus, options: &ContinuationOptions) -> Vec<ContinuationAction> {
    use ContinuationAction::*;

    match status {
        s if s.is_rollback_in_progress() => vec![ContinueRollback],
        StackStatus::RollbackFailed
        | StackStatus::UpdateRollbackFailed
        | StackStatus::ImportRollbackFailed => vec![ContinueRollback],
        s if s.is_cleanup_in_progress() => vec![CancelUpdate],
        StackStatus::DeleteFailed => vec![DeleteStack],
        StackStatus::CreateInProgress | StackStatus::UpdateInProgress
            if options.delete_in_progress =>
        {
            vec![CancelUpdate, DeleteStack]
        }
        StackStatus::UpdateInProgress => vec![CancelUpdate],
        _ => vec![],
    }
}

/// Logical ids of unfixable resources to skip when continuing a rollback.
///
/// The stack itself and any entry that refers back to it are never
/// included; the backend rejects such skip-lists.
pub fn build_skip_list(stack: &StackSnapshot, results: &[RemediationResult]) -> Vec<String> {
    let self_marker = format!("stack/{}/", stack.name);
    let mut skip: Vec<String> = Vec::new();

    for result in results.iter().filter(|r| r.unfixable) {
        let resource = &result.resource;
        let physical = resource.physical_id.as_deref();

        let self_referencing = resource.logical_id == stack.name
            || resource.logical_id == stack.stack_id
            || physical == Some(stack.name.as_str())
            || physical == Some(stack.stack_id.as_str())
            || (resource.kind() == ResourceKind::Stack
                && physical.is_some_and(|p| p.contains(&self_marker)));

        if self_referencing {
            debug!(stack = %stack.name, logical_id = %resource.logical_id, "Excluding self reference from skip-list");
            continue;
        }
        if !skip.contains(&resource.logical_id) {
            skip.push(resource.logical_id.clone());
        }
    }

    skip
}

/// Issues stack-level operations for stuck stacks
pub struct RollbackContinuation<'a> {
    session: &'a Session,
    dry_run: bool,
}

impl<'a> RollbackContinuation<'a> {
    pub fn new(session: &'a Session, dry_run: bool) -> Self {
        Self { session, dry_run }
    }

    /// Apply the decision table to one stack, given the remediation results
    /// gathered for its resources
    pub async fn run(
        &self,
        stack: &StackSnapshot,
        results: &[RemediationResult],
        options: &ContinuationOptions,
    ) -> ContinuationOutcome {
        let actions = plan(stack.status, options);
        let skip_list = if options.skip_unfixable && actions.contains(&ContinuationAction::ContinueRollback) {
            build_skip_list(stack, results)
        } else {
            Vec::new()
        };

        let mut outcome = ContinuationOutcome {
            stack: stack.name.clone(),
            status: stack.status,
            skip_list,
            steps: Vec::new(),
            succeeded: false,
            note: None,
        };

        for action in &actions {
            let step = self.execute(&stack.name, *action, &outcome.skip_list).await;
            let stop = !step.succeeded;
            outcome.steps.push(step);
            if stop {
                break;
            }
        }
        outcome.succeeded = outcome.steps.last().is_some_and(|s| s.succeeded);

        if options.force_delete && !outcome.succeeded && (!self.dry_run || actions.is_empty()) {
            warn!(stack = %stack.name, status = %stack.status, "Force deleting stack as last resort");
            let step = self
                .execute(&stack.name, ContinuationAction::DeleteStack, &[])
                .await;
            outcome.succeeded = step.succeeded;
            outcome.steps.push(step);
        }

        if outcome.steps.is_empty() {
            outcome.note = Some(format!("no continuation applies to {}", stack.status));
            info!(stack = %stack.name, status = %stack.status, "No continuation applies");
        }

        outcome
    }

    async fn execute(&self, stack: &str, action: ContinuationAction, skip: &[String]) -> ContinuationStep {
        if self.dry_run {
            let detail = if skip.is_empty() {
                format!("Dry run: would {action}")
            } else {
                format!("Dry run: would {action} skipping {}", skip.join(", "))
            };
            return ContinuationStep {
                action,
                succeeded: false,
                detail,
            };
        }

        let stacks = &self.session.backends.stacks;
        let result = match action {
            ContinuationAction::ContinueRollback => stacks.continue_rollback(stack, skip).await,
            ContinuationAction::CancelUpdate => stacks.cancel_update(stack).await,
            ContinuationAction::DeleteStack => stacks.delete_stack(stack).await,
        };

        let (succeeded, detail) = match result {
            Ok(()) if skip.is_empty() => (true, format!("{action} issued")),
            Ok(()) => (true, format!("{action} issued skipping {}", skip.join(", "))),
            Err(e) if e.is_no_op() => (true, format!("nothing to do: {}", e.message)),
            Err(e) if e.is_not_found() => (true, "stack no longer exists".to_string()),
            Err(e) if e.is_conflict() && action == ContinuationAction::CancelUpdate => (
                true,
                "operation cannot be cancelled, waiting for natural completion".to_string(),
            ),
            Err(e) => (false, e.to_string()),
        };

        self.session
            .logger
            .log_continuation(stack, &action.to_string(), succeeded, &detail);

        ContinuationStep {
            action,
            succeeded,
            detail,
        }
    }
}

/// Poll a stack until it settles.
///
/// Returns true once the stack reaches any `*_COMPLETE` status or no longer
/// exists, false on a failure status or when `timeout` elapses.
pub async fn wait_for_stable(session: &Session, stack: &str, timeout: Duration, interval: Duration) -> bool {
    let deadline = Instant::now() + timeout;

    loop {
        match session.backends.stacks.describe_stack(stack).await {
            Ok(record) if record.status.is_complete() => {
                info!(stack = %stack, status = %record.status, "Stack stabilized");
                return true;
            }
            Ok(record) if record.status.is_failed() => {
                warn!(stack = %stack, status = %record.status, "Stack settled in a failure state");
                return false;
            }
            Ok(record) => {
                debug!(stack = %stack, status = %record.status, "Waiting for stack to stabilize");
            }
            Err(e) if e.is_not_found() => {
                info!(stack = %stack, "Stack no longer exists");
                return true;
            }
            Err(e) => {
                warn!(stack = %stack, error = %e, "Failed to poll stack status");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(stack = %stack, timeout_secs = timeout.as_secs(), "Timed out waiting for stack to stabilize");
            return false;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
