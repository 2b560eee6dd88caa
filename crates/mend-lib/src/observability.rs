//! Structured logging for engine events
//!
//! Every significant step (stuck stack found, remediation applied,
//! continuation issued, verdict reached) is logged through
//! [`StructuredLogger`] so the field names stay stable across commands and
//! JSON log consumers can rely on them.

use crate::models::{RemediationResult, StackSnapshot};
use tracing::{info, warn};

/// Structured logger for engine events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    environment: String,
}

impl StructuredLogger {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Log the start of a command run
    pub fn log_run_start(&self, command: &str, dry_run: bool) {
        info!(
            event = "run_started",
            environment = %self.environment,
            command = %command,
            dry_run = dry_run,
            "Starting reconciliation run"
        );
    }

    /// Log a stack found stuck during inspection
    pub fn log_stuck_stack(&self, stack: &StackSnapshot) {
        warn!(
            event = "stack_stuck",
            environment = %self.environment,
            stack = %stack.name,
            status = %stack.status,
            age_minutes = stack.age_minutes,
            recommended_action = %stack.recommended_action,
            reason = stack.stuck_reason.as_deref().unwrap_or(""),
            "Stack is stuck"
        );
    }

    /// Log the outcome of one remediation attempt
    pub fn log_remediation(&self, stack: &str, result: &RemediationResult) {
        if result.fixed {
            info!(
                event = "resource_remediated",
                environment = %self.environment,
                stack = %stack,
                logical_id = %result.resource.logical_id,
                resource_type = %result.resource.resource_type,
                reason = %result.reason,
                "Resource remediated"
            );
        } else if result.unfixable {
            warn!(
                event = "resource_unfixable",
                environment = %self.environment,
                stack = %stack,
                logical_id = %result.resource.logical_id,
                resource_type = %result.resource.resource_type,
                reason = %result.reason,
                "Resource cannot be remediated"
            );
        } else {
            warn!(
                event = "resource_remediation_failed",
                environment = %self.environment,
                stack = %stack,
                logical_id = %result.resource.logical_id,
                resource_type = %result.resource.resource_type,
                reason = %result.reason,
                "Resource remediation did not succeed"
            );
        }
    }

    /// Log a rollback continuation step
    pub fn log_continuation(&self, stack: &str, action: &str, succeeded: bool, detail: &str) {
        if succeeded {
            info!(
                event = "continuation_applied",
                environment = %self.environment,
                stack = %stack,
                action = %action,
                detail = %detail,
                "Stack operation issued"
            );
        } else {
            warn!(
                event = "continuation_failed",
                environment = %self.environment,
                stack = %stack,
                action = %action,
                detail = %detail,
                "Stack operation failed"
            );
        }
    }

    /// Log the final go/no-go decision
    pub fn log_verdict(&self, can_proceed: bool, critical: usize, warnings: usize) {
        if can_proceed {
            info!(
                event = "verdict",
                environment = %self.environment,
                can_proceed = true,
                critical_issues = critical,
                warnings = warnings,
                "Deployment may proceed"
            );
        } else {
            warn!(
                event = "verdict",
                environment = %self.environment,
                can_proceed = false,
                critical_issues = critical,
                warnings = warnings,
                "Deployment blocked"
            );
        }
    }
}
