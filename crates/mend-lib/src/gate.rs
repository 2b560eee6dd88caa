//! Pre-deployment health gate
//!
//! Single-shot go/no-go check:
//! 1. inspect the environment's stacks
//! 2. detect a rollback that completed within the recent-rollback window
//! 3. check workload services, leniently while a recent rollback recovers
//! 4. after the grace period, re-check recovering services strictly
//! 5. optionally auto-fix stuck stacks and wait for them to stabilize
//!
//! Deployment may proceed only when no critical issue remains.

use crate::continuation::{wait_for_stable, ContinuationOptions};
use crate::fixer::{FixOptions, StuckStackFixer};
use crate::health::{HealthVerdict, Issue, IssueSubject};
use crate::inspector::{InspectOptions, StackStateInspector};
use crate::models::StackSnapshot;
use crate::services::ServiceHealthCheck;
use crate::session::Session;
use futures::future::join_all;
use tracing::{info, warn};

/// Gate options
#[derive(Debug, Clone, Copy, Default)]
pub struct GateOptions {
    /// Remediate stuck stacks that need intervention
    pub auto_fix: bool,
    /// Skip service checks entirely while a recent rollback recovers
    pub skip_ecs_after_rollback: bool,
}

pub struct DeploymentHealthGate<'a> {
    session: &'a Session,
}

impl<'a> DeploymentHealthGate<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub async fn check(&self, options: &GateOptions) -> HealthVerdict {
        let session = self.session;
        session.logger.log_run_start("gate", false);

        let mut issues = Vec::new();
        let mut actions = Vec::new();

        let report = StackStateInspector::new(session)
            .inspect(&InspectOptions::default())
            .await;

        for error in &report.errors {
            issues.push(Issue::critical(
                IssueSubject::Inspection,
                &error.stack,
                format!("unable to inspect stack: {}", error.message),
            ));
        }

        for stack in &report.stacks {
            if stack.stuck {
                issues.push(stuck_issue(stack));
            } else if stack.status.is_in_progress() {
                issues.push(Issue::info(
                    IssueSubject::Stack,
                    &stack.name,
                    format!("{} for {} minutes", stack.status, stack.age_minutes),
                ));
            }
        }

        let window = session.config.recent_rollback_window_mins;
        let recent_rollbacks: Vec<&StackSnapshot> = report
            .stacks
            .iter()
            .filter(|s| s.status.is_rollback_complete() && s.age_minutes < window)
            .collect();
        for stack in &recent_rollbacks {
            info!(stack = %stack.name, age_minutes = stack.age_minutes, "Recent rollback detected");
            issues.push(Issue::info(
                IssueSubject::Stack,
                &stack.name,
                format!("rollback completed {} minutes ago", stack.age_minutes),
            ));
        }
        let recent_rollback = !recent_rollbacks.is_empty();

        if recent_rollback && options.skip_ecs_after_rollback {
            actions.push("skipped service checks after recent rollback".to_string());
        } else {
            let checker = ServiceHealthCheck::new(session);
            let mut services = checker.check(recent_rollback).await;

            if services.has_recovering() {
                let grace = session.config.recovery_grace();
                info!(grace_secs = grace.as_secs(), "Waiting for services to recover after rollback");
                tokio::time::sleep(grace).await;
                actions.push(format!(
                    "waited {}s for services to recover after rollback",
                    grace.as_secs()
                ));
                services = checker.check(false).await;
            }

            issues.extend(services.issues);
        }

        let needs_intervention: Vec<&StackSnapshot> = report
            .stuck()
            .filter(|s| s.recommended_action.requires_intervention())
            .collect();

        if options.auto_fix {
            let outcomes = join_all(needs_intervention.iter().map(|stack| self.auto_fix(stack))).await;
            for (stack, stable) in needs_intervention.iter().zip(outcomes) {
                if stable {
                    issues.retain(|i| !(i.subject == IssueSubject::Stack && i.name == stack.name));
                    actions.push(format!("auto-fixed stack {}", stack.name));
                } else {
                    actions.push(format!("auto-fix of stack {} did not stabilize", stack.name));
                }
            }
        } else {
            for stack in &needs_intervention {
                actions.push(format!(
                    "run fix for stack {} ({})",
                    stack.name, stack.recommended_action
                ));
            }
        }

        let verdict = HealthVerdict::from_issues(&session.environment, issues, actions);
        session.logger.log_verdict(
            verdict.can_proceed,
            verdict.critical_count(),
            verdict.warning_count(),
        );
        verdict
    }

    /// Remediate, continue and wait for one stack; true once it is stable
    async fn auto_fix(&self, stack: &StackSnapshot) -> bool {
        let options = FixOptions {
            stack_name: Some(stack.name.clone()),
            dry_run: false,
            continuation: ContinuationOptions {
                skip_unfixable: true,
                ..Default::default()
            },
        };

        let fix = StuckStackFixer::new(self.session).fix_stack(stack, &options).await;
        if !fix.resolved() {
            warn!(stack = %stack.name, "Auto-fix could not unblock stack");
            return false;
        }

        let config = &self.session.config;
        wait_for_stable(
            self.session,
            &stack.name,
            config.stabilization_timeout(),
            config.stabilization_interval(),
        )
        .await
    }
}

fn stuck_issue(stack: &StackSnapshot) -> Issue {
    let reason = stack
        .stuck_reason
        .clone()
        .unwrap_or_else(|| stack.status.to_string());
    Issue::critical(
        IssueSubject::Stack,
        &stack.name,
        format!("stuck: {reason} (recommended: {})", stack.recommended_action),
    )
}
