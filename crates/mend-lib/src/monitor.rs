//! Deployment monitor
//!
//! Combines stack inspection with service snapshots into one of four states,
//! in order of precedence:
//! - `ROLLBACK_NEEDED`: a service is down or its rollout failed, or a stack
//!   failed or needs its rollback continued
//! - `DEPLOYING`: a stack operation or service rollout is in flight
//! - `FAILED`: a service runs with fewer tasks than desired, or part of the
//!   environment could not be read
//! - `HEALTHY`: none of the above
//!
//! Failure reasons from stopped tasks, rollouts and stack events are matched
//! against known signatures to produce targeted recommendations.

use crate::inspector::{InspectOptions, StackStateInspector};
use crate::models::{RecommendedAction, ResourceEvent, ServiceSnapshot, StackSnapshot, TaskFailure};
use crate::services::ServiceHealthCheck;
use crate::session::Session;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Overall deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Healthy,
    Deploying,
    Failed,
    RollbackNeeded,
}

impl OverallStatus {
    /// 0 healthy, 1 rollback needed, 2 still deploying or degraded
    pub fn exit_code(&self) -> i32 {
        match self {
            OverallStatus::Healthy => 0,
            OverallStatus::RollbackNeeded => 1,
            OverallStatus::Deploying | OverallStatus::Failed => 2,
        }
    }

    /// Continuous monitoring stops on these states
    pub fn is_terminal(&self) -> bool {
        matches!(self, OverallStatus::Healthy | OverallStatus::RollbackNeeded)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OverallStatus::Healthy => "HEALTHY",
            OverallStatus::Deploying => "DEPLOYING",
            OverallStatus::Failed => "FAILED",
            OverallStatus::RollbackNeeded => "ROLLBACK_NEEDED",
        };
        f.write_str(label)
    }
}

/// Root output of the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub environment: String,
    pub checked_at: DateTime<Utc>,
    pub overall_status: OverallStatus,
    pub services: Vec<ServiceSnapshot>,
    pub stacks: Vec<StackSnapshot>,
    pub recommendations: Vec<String>,
    /// Failure events first seen in this pass
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub new_events: Vec<ResourceEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

impl DeploymentStatus {
    pub fn exit_code(&self) -> i32 {
        self.overall_status.exit_code()
    }
}

/// Classify an environment by precedence
pub fn overall_status(stacks: &[StackSnapshot], services: &[ServiceSnapshot]) -> OverallStatus {
    let active: Vec<&ServiceSnapshot> = services.iter().filter(|s| s.is_active()).collect();

    let rollback_needed = stacks.iter().any(stack_needs_rollback)
        || active.iter().any(|s| service_needs_rollback(s));
    if rollback_needed {
        return OverallStatus::RollbackNeeded;
    }

    let deploying = stacks.iter().any(|s| s.status.is_in_progress())
        || active.iter().any(|s| s.is_deploying());
    if deploying {
        return OverallStatus::Deploying;
    }

    if active.iter().any(|s| s.is_degraded()) {
        return OverallStatus::Failed;
    }

    OverallStatus::Healthy
}

/// A pass with read errors is never reported healthy
fn account_for_errors(status: OverallStatus, errors: &[String]) -> OverallStatus {
    if status == OverallStatus::Healthy && !errors.is_empty() {
        OverallStatus::Failed
    } else {
        status
    }
}

fn stack_needs_rollback(stack: &StackSnapshot) -> bool {
    stack.status.is_failed()
        || (stack.stuck && stack.recommended_action == RecommendedAction::ContinueRollback)
}

fn service_needs_rollback(service: &ServiceSnapshot) -> bool {
    service.is_down()
        || service
            .deployments
            .iter()
            .any(|d| d.is_primary() && d.is_rollout_failed())
}

/// Remediation suggestions for a service from its failure reasons
pub fn recommendations_for(service: &str, reasons: &[String], exit_codes: &[i32]) -> Vec<String> {
    let mut out = Vec::new();
    let lowered: Vec<String> = reasons.iter().map(|r| r.to_ascii_lowercase()).collect();

    if lowered.iter().any(|r| r.contains("health check")) {
        out.push(format!(
            "{service}: tasks fail health checks before becoming ready; increase the health check grace period"
        ));
    }
    if reasons.iter().any(|r| r.contains("OOM"))
        || lowered.iter().any(|r| r.contains("outofmemory") || r.contains("out of memory"))
    {
        out.push(format!(
            "{service}: containers were killed for running out of memory; raise the task memory limit"
        ));
    }
    if exit_codes.iter().any(|c| *c != 0) || lowered.iter().any(|r| r.contains("exit code")) {
        out.push(format!(
            "{service}: containers exited with a non-zero exit code; check the container logs"
        ));
    }

    out
}

fn failure_reasons(service: &ServiceSnapshot, tasks: &[TaskFailure]) -> (Vec<String>, Vec<i32>) {
    let mut reasons: Vec<String> = service
        .deployments
        .iter()
        .filter_map(|d| d.rollout_state_reason.clone())
        .collect();
    let mut exit_codes = Vec::new();

    for task in tasks {
        reasons.extend(task.stopped_reason.iter().cloned());
        reasons.extend(task.container_reasons.iter().cloned());
        exit_codes.extend(task.exit_codes.iter().copied());
    }

    (reasons, exit_codes)
}

/// Polls stacks and services. Tracks the last event time seen per stack for
/// the lifetime of the instance.
pub struct DeploymentMonitor<'a> {
    session: &'a Session,
    started_at: DateTime<Utc>,
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl<'a> DeploymentMonitor<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            started_at: Utc::now(),
            last_seen: HashMap::new(),
        }
    }

    /// One monitoring pass
    pub async fn status(&mut self) -> DeploymentStatus {
        let session = self.session;
        let mut errors = Vec::new();

        let report = StackStateInspector::new(session)
            .inspect(&InspectOptions::default())
            .await;
        errors.extend(
            report
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.stack, e.message)),
        );

        let services = match ServiceHealthCheck::new(session).snapshot().await {
            Ok(services) => services,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => {
                errors.push(format!("services: {e}"));
                Vec::new()
            }
        };

        let new_events = self.collect_new_events(&report.stacks).await;
        let overall = account_for_errors(overall_status(&report.stacks, &services), &errors);
        let recommendations = self
            .recommendations(overall, &report.stacks, &services, &new_events)
            .await;

        info!(
            environment = %session.environment,
            overall_status = %overall,
            stacks = report.stacks.len(),
            services = services.len(),
            new_events = new_events.len(),
            "Deployment status"
        );

        DeploymentStatus {
            environment: session.environment.clone(),
            checked_at: report.inspected_at,
            overall_status: overall,
            services,
            stacks: report.stacks,
            recommendations,
            new_events,
            errors,
        }
    }

    /// Poll every `interval` until a terminal state, `duration` elapses or
    /// `shutdown` resolves; returns the last status observed
    pub async fn run<F>(&mut self, interval: Duration, duration: Duration, shutdown: F) -> DeploymentStatus
    where
        F: Future<Output = ()>,
    {
        let deadline = Instant::now() + duration;
        tokio::pin!(shutdown);

        loop {
            let status = self.status().await;
            if status.overall_status.is_terminal() {
                return status;
            }
            if Instant::now() >= deadline {
                warn!(duration_secs = duration.as_secs(), "Monitoring duration elapsed");
                return status;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => {
                    info!("Monitoring interrupted");
                    return status;
                }
            }
        }
    }

    /// Failure events newer than the last time each stack was polled
    async fn collect_new_events(&mut self, stacks: &[StackSnapshot]) -> Vec<ResourceEvent> {
        let api = &self.session.backends.stacks;
        let results = join_all(stacks.iter().map(|s| api.describe_stack_events(&s.name))).await;

        let mut new_events = Vec::new();
        for (stack, result) in stacks.iter().zip(results) {
            let events = match result {
                Ok(events) => events,
                Err(e) => {
                    debug!(stack = %stack.name, error = %e, "Failed to read stack events");
                    continue;
                }
            };

            let since = self
                .last_seen
                .get(&stack.name)
                .copied()
                .unwrap_or(self.started_at);
            let fresh: Vec<ResourceEvent> = events.into_iter().filter(|e| e.timestamp > since).collect();

            if let Some(latest) = fresh.iter().map(|e| e.timestamp).max() {
                self.last_seen.insert(stack.name.clone(), latest);
            }

            for event in fresh.into_iter().filter(|e| e.is_failed()) {
                warn!(
                    stack = %stack.name,
                    logical_id = %event.logical_id,
                    status = %event.status,
                    reason = event.reason.as_deref().unwrap_or(""),
                    "New failure event"
                );
                new_events.push(event);
            }
        }

        new_events
    }

    async fn recommendations(
        &self,
        overall: OverallStatus,
        stacks: &[StackSnapshot],
        services: &[ServiceSnapshot],
        new_events: &[ResourceEvent],
    ) -> Vec<String> {
        let mut out = Vec::new();

        if overall == OverallStatus::RollbackNeeded {
            out.push("Roll back the deployment or run `stackmend fix` on the failed stacks".to_string());
        }
        for stack in stacks.iter().filter(|s| s.stuck) {
            out.push(format!("{}: {}", stack.name, stack.recommended_action));
        }

        let unhealthy: Vec<&ServiceSnapshot> = services
            .iter()
            .filter(|s| s.is_active() && (s.is_down() || s.is_degraded() || service_needs_rollback(s)))
            .collect();
        let api = &self.session.backends.services;
        let tasks = join_all(
            unhealthy
                .iter()
                .map(|s| api.stopped_tasks(&s.cluster, &s.name)),
        )
        .await;

        for (service, tasks) in unhealthy.iter().zip(tasks) {
            let tasks = tasks.unwrap_or_else(|e| {
                debug!(service = %service.name, error = %e, "Failed to read stopped tasks");
                Vec::new()
            });
            let (reasons, exit_codes) = failure_reasons(service, &tasks);
            out.extend(recommendations_for(&service.name, &reasons, &exit_codes));
        }

        for event in new_events {
            if let Some(reason) = &event.reason {
                out.extend(recommendations_for(
                    &event.logical_id,
                    std::slice::from_ref(reason),
                    &[],
                ));
            }
        }

        let mut seen = std::collections::HashSet::new();
        out.retain(|r| seen.insert(r.clone()));
        out
    }
}
