//! Core data models for stack and service reconciliation
//!
//! Every type here is derived from a single live snapshot and is rebuilt on
//! each pass; nothing is persisted between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a provisioning stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateFailed,
    UpdateRollbackInProgress,
    UpdateRollbackFailed,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    ReviewInProgress,
    ImportInProgress,
    ImportComplete,
    ImportRollbackInProgress,
    ImportRollbackFailed,
    ImportRollbackComplete,
    #[serde(other)]
    Unknown,
}

const STATUS_NAMES: &[(StackStatus, &str)] = &[
    (StackStatus::CreateInProgress, "CREATE_IN_PROGRESS"),
    (StackStatus::CreateFailed, "CREATE_FAILED"),
    (StackStatus::CreateComplete, "CREATE_COMPLETE"),
    (StackStatus::RollbackInProgress, "ROLLBACK_IN_PROGRESS"),
    (StackStatus::RollbackFailed, "ROLLBACK_FAILED"),
    (StackStatus::RollbackComplete, "ROLLBACK_COMPLETE"),
    (StackStatus::DeleteInProgress, "DELETE_IN_PROGRESS"),
    (StackStatus::DeleteFailed, "DELETE_FAILED"),
    (StackStatus::DeleteComplete, "DELETE_COMPLETE"),
    (StackStatus::UpdateInProgress, "UPDATE_IN_PROGRESS"),
    (
        StackStatus::UpdateCompleteCleanupInProgress,
        "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
    ),
    (StackStatus::UpdateComplete, "UPDATE_COMPLETE"),
    (StackStatus::UpdateFailed, "UPDATE_FAILED"),
    (StackStatus::UpdateRollbackInProgress, "UPDATE_ROLLBACK_IN_PROGRESS"),
    (StackStatus::UpdateRollbackFailed, "UPDATE_ROLLBACK_FAILED"),
    (
        StackStatus::UpdateRollbackCompleteCleanupInProgress,
        "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS",
    ),
    (StackStatus::UpdateRollbackComplete, "UPDATE_ROLLBACK_COMPLETE"),
    (StackStatus::ReviewInProgress, "REVIEW_IN_PROGRESS"),
    (StackStatus::ImportInProgress, "IMPORT_IN_PROGRESS"),
    (StackStatus::ImportComplete, "IMPORT_COMPLETE"),
    (StackStatus::ImportRollbackInProgress, "IMPORT_ROLLBACK_IN_PROGRESS"),
    (StackStatus::ImportRollbackFailed, "IMPORT_ROLLBACK_FAILED"),
    (StackStatus::ImportRollbackComplete, "IMPORT_ROLLBACK_COMPLETE"),
];

impl StackStatus {
    pub fn as_str(&self) -> &'static str {
        STATUS_NAMES
            .iter()
            .find(|(status, _)| status == self)
            .map(|(_, name)| *name)
            .unwrap_or("UNKNOWN")
    }

    /// Terminal failure variants. These are stuck regardless of age.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            StackStatus::CreateFailed
                | StackStatus::UpdateFailed
                | StackStatus::DeleteFailed
                | StackStatus::RollbackFailed
                | StackStatus::UpdateRollbackFailed
                | StackStatus::ImportRollbackFailed
        )
    }

    pub fn is_in_progress(&self) -> bool {
        self.as_str().ends_with("_IN_PROGRESS")
    }

    pub fn is_complete(&self) -> bool {
        self.as_str().ends_with("_COMPLETE")
    }

    /// Completed rollback variants, used for recent-rollback detection
    pub fn is_rollback_complete(&self) -> bool {
        matches!(
            self,
            StackStatus::RollbackComplete
                | StackStatus::UpdateRollbackComplete
                | StackStatus::ImportRollbackComplete
        )
    }

    pub fn is_rollback_in_progress(&self) -> bool {
        matches!(
            self,
            StackStatus::RollbackInProgress
                | StackStatus::UpdateRollbackInProgress
                | StackStatus::ImportRollbackInProgress
        )
    }

    pub fn is_cleanup_in_progress(&self) -> bool {
        matches!(
            self,
            StackStatus::UpdateCompleteCleanupInProgress
                | StackStatus::UpdateRollbackCompleteCleanupInProgress
        )
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(STATUS_NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s.trim()))
            .map(|(status, _)| *status)
            .unwrap_or(StackStatus::Unknown))
    }
}

/// What the engine recommends doing with a stuck stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Nothing to do
    None,
    /// Cancel the in-flight operation or continue the rollback
    ContinueRollback,
    /// Cancel the in-flight update
    CancelUpdate,
    /// Retry a failed delete
    RetryDelete,
    /// Delete the stack
    Delete,
    /// Let the backend finish on its own
    Wait,
}

impl RecommendedAction {
    pub fn for_status(status: StackStatus) -> Self {
        match status {
            s if s.is_rollback_in_progress() => RecommendedAction::ContinueRollback,
            StackStatus::UpdateRollbackFailed
            | StackStatus::RollbackFailed
            | StackStatus::ImportRollbackFailed
            | StackStatus::UpdateFailed => RecommendedAction::ContinueRollback,
            StackStatus::UpdateInProgress => RecommendedAction::CancelUpdate,
            s if s.is_cleanup_in_progress() => RecommendedAction::CancelUpdate,
            StackStatus::DeleteFailed => RecommendedAction::RetryDelete,
            StackStatus::CreateFailed | StackStatus::CreateInProgress => {
                RecommendedAction::Delete
            }
            StackStatus::DeleteInProgress
            | StackStatus::ReviewInProgress
            | StackStatus::ImportInProgress => RecommendedAction::Wait,
            _ => RecommendedAction::None,
        }
    }

    /// Whether acting on this recommendation involves cancelling or
    /// reversing the in-flight operation
    pub fn requires_intervention(&self) -> bool {
        !matches!(self, RecommendedAction::None | RecommendedAction::Wait)
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecommendedAction::None => "none",
            RecommendedAction::ContinueRollback => "cancel/continue-rollback",
            RecommendedAction::CancelUpdate => "cancel-update",
            RecommendedAction::RetryDelete => "retry-delete",
            RecommendedAction::Delete => "delete",
            RecommendedAction::Wait => "wait",
        };
        f.write_str(label)
    }
}

/// A stack as observed in a single inspection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSnapshot {
    pub name: String,
    pub stack_id: String,
    pub status: StackStatus,
    pub last_transition_time: DateTime<Utc>,
    pub age_minutes: i64,
    pub stuck: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stuck_reason: Option<String>,
    pub recommended_action: RecommendedAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

/// Raw record returned by the stack backend before classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackRecord {
    pub name: String,
    pub stack_id: String,
    pub status: StackStatus,
    pub last_transition_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

/// One entry from a stack's resource event history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub logical_id: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ResourceEvent {
    pub fn is_in_progress(&self) -> bool {
        self.status.contains("IN_PROGRESS")
    }

    pub fn is_failed(&self) -> bool {
        self.status.contains("FAILED")
    }

    pub fn kind(&self) -> ResourceKind {
        ResourceKind::from_type(&self.resource_type)
    }
}

/// Resource categories the dispatcher knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ScalingPolicy,
    ScalableTarget,
    Service,
    TargetGroup,
    TaskDefinition,
    Stack,
    Other,
}

impl ResourceKind {
    pub fn from_type(resource_type: &str) -> Self {
        match resource_type {
            "AWS::ApplicationAutoScaling::ScalingPolicy" => ResourceKind::ScalingPolicy,
            "AWS::ApplicationAutoScaling::ScalableTarget" => ResourceKind::ScalableTarget,
            "AWS::ECS::Service" => ResourceKind::Service,
            "AWS::ElasticLoadBalancingV2::TargetGroup" => ResourceKind::TargetGroup,
            "AWS::ECS::TaskDefinition" => ResourceKind::TaskDefinition,
            "AWS::CloudFormation::Stack" => ResourceKind::Stack,
            _ => ResourceKind::Other,
        }
    }

    /// Autoscaling constructs break more often than anything else and are
    /// always remediated first
    pub fn is_fragile(&self) -> bool {
        matches!(self, ResourceKind::ScalingPolicy | ResourceKind::ScalableTarget)
    }

    /// Remediation priority, lower runs first
    pub fn priority(&self) -> u8 {
        match self {
            ResourceKind::ScalingPolicy => 1,
            ResourceKind::ScalableTarget => 2,
            ResourceKind::Service => 3,
            ResourceKind::TargetGroup => 4,
            ResourceKind::TaskDefinition => 5,
            ResourceKind::Stack | ResourceKind::Other => 10,
        }
    }
}

/// Identity of a managed resource within a stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub logical_id: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,
}

impl ResourceRef {
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::from_type(&self.resource_type)
    }
}

/// A resource found to be blocking stack progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckResource {
    pub resource: ResourceRef,
    pub status: String,
    pub classification_reason: String,
    pub priority_rank: u8,
    pub last_event_time: DateTime<Utc>,
}

/// Outcome of one remediation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationResult {
    pub resource: ResourceRef,
    pub fixed: bool,
    pub unfixable: bool,
    pub reason: String,
}

impl RemediationResult {
    pub fn fixed(resource: &ResourceRef, reason: impl Into<String>) -> Self {
        Self {
            resource: resource.clone(),
            fixed: true,
            unfixable: false,
            reason: reason.into(),
        }
    }

    pub fn unfixable(resource: &ResourceRef, reason: impl Into<String>) -> Self {
        Self {
            resource: resource.clone(),
            fixed: false,
            unfixable: true,
            reason: reason.into(),
        }
    }

    /// Attempted but did not succeed; eligible for retry
    pub fn failed(resource: &ResourceRef, reason: impl Into<String>) -> Self {
        Self {
            resource: resource.clone(),
            fixed: false,
            unfixable: false,
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        !self.fixed && !self.unfixable
    }
}

/// One rollout of a workload service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDeployment {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout_state_reason: Option<String>,
    pub running_count: u32,
    pub desired_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_tasks: Option<u32>,
}

impl ServiceDeployment {
    pub fn is_primary(&self) -> bool {
        self.status == "PRIMARY"
    }

    pub fn is_rollout_failed(&self) -> bool {
        self.rollout_state.as_deref() == Some("FAILED")
    }

    pub fn is_rollout_in_progress(&self) -> bool {
        self.rollout_state.as_deref() == Some("IN_PROGRESS")
    }
}

/// A workload service as currently reported by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub cluster: String,
    pub status: String,
    pub running_count: u32,
    pub desired_count: u32,
    #[serde(default)]
    pub deployments: Vec<ServiceDeployment>,
}

impl ServiceSnapshot {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }

    pub fn is_down(&self) -> bool {
        self.desired_count > 0 && self.running_count == 0
    }

    pub fn is_degraded(&self) -> bool {
        self.running_count > 0 && self.running_count < self.desired_count
    }

    pub fn is_deploying(&self) -> bool {
        self.deployments.len() > 1 || self.deployments.iter().any(|d| d.is_rollout_in_progress())
    }
}

/// A stopped task, read to explain why a service is unhealthy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_reason: Option<String>,
    #[serde(default)]
    pub container_reasons: Vec<String>,
    #[serde(default)]
    pub exit_codes: Vec<i32>,
}

/// A scaling policy attached to a scalable dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub name: String,
    pub arn: String,
    pub resource_id: String,
}

/// A registered scalable target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalableTarget {
    pub resource_id: String,
    pub min_capacity: u32,
    pub max_capacity: u32,
}

/// A target registered with a load balancer target group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredTarget {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_name() {
        let status: StackStatus = "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS".parse().unwrap();
        assert_eq!(status, StackStatus::UpdateRollbackCompleteCleanupInProgress);
        assert_eq!(status.to_string(), "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS");
        assert!(status.is_in_progress());
        assert!(status.is_cleanup_in_progress());
    }

    #[test]
    fn test_unknown_status() {
        let status: StackStatus = "SOMETHING_NEW".parse().unwrap();
        assert_eq!(status, StackStatus::Unknown);
        assert!(!status.is_failed());
        assert!(!status.is_in_progress());
    }

    #[test]
    fn test_serde_matches_display() {
        let json = serde_json::to_string(&StackStatus::UpdateRollbackInProgress).unwrap();
        assert_eq!(json, "\"UPDATE_ROLLBACK_IN_PROGRESS\"");
    }

    #[test]
    fn test_recommended_actions() {
        assert_eq!(
            RecommendedAction::for_status(StackStatus::UpdateRollbackInProgress),
            RecommendedAction::ContinueRollback
        );
        assert_eq!(
            RecommendedAction::for_status(StackStatus::DeleteFailed),
            RecommendedAction::RetryDelete
        );
        assert_eq!(
            RecommendedAction::for_status(StackStatus::UpdateComplete),
            RecommendedAction::None
        );
        assert!(!RecommendedAction::Wait.requires_intervention());
    }

    #[test]
    fn test_resource_priorities() {
        assert!(ResourceKind::ScalingPolicy.priority() < ResourceKind::ScalableTarget.priority());
        assert!(ResourceKind::ScalableTarget.priority() < ResourceKind::Service.priority());
        assert_eq!(ResourceKind::from_type("AWS::S3::Bucket").priority(), 10);
        assert!(ResourceKind::ScalableTarget.is_fragile());
        assert!(!ResourceKind::Service.is_fragile());
    }

    #[test]
    fn test_service_health_predicates() {
        let service = ServiceSnapshot {
            name: "api".to_string(),
            cluster: "dev-cluster".to_string(),
            status: "ACTIVE".to_string(),
            running_count: 0,
            desired_count: 3,
            deployments: vec![],
        };
        assert!(service.is_down());
        assert!(!service.is_degraded());

        let idle = ServiceSnapshot {
            desired_count: 0,
            ..service
        };
        assert!(!idle.is_down());
    }
}
