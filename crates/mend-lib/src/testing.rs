//! In-memory backend for unit tests
//!
//! Holds a tiny model of stacks, services, target groups and autoscaling
//! state, applies mutations the way the real provider would, records every
//! call and lets tests queue failures per operation.

use crate::backend::{async_trait, Backends, LoadBalancerApi, ScalingApi, ServiceApi, StackApi};
use crate::config::EngineConfig;
use crate::error::{BackendError, BackendResult, ErrorKind};
use crate::models::{
    RegisteredTarget, ResourceEvent, ScalableTarget, ScalingPolicy, ServiceSnapshot,
    StackRecord, StackStatus, TaskFailure,
};
use crate::session::Session;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct FakeState {
    stacks: HashMap<String, StackRecord>,
    events: HashMap<String, Vec<ResourceEvent>>,
    clusters: HashSet<String>,
    services: HashMap<(String, String), ServiceSnapshot>,
    stopped_tasks: HashMap<String, Vec<TaskFailure>>,
    target_groups: HashMap<String, Vec<RegisteredTarget>>,
    policies: Vec<ScalingPolicy>,
    scalable_targets: HashMap<String, ScalableTarget>,
    failures: HashMap<String, VecDeque<BackendError>>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_stack(&self, name: &str, status: StackStatus, age_minutes: i64) {
        self.state().stacks.insert(
            name.to_string(),
            StackRecord {
                name: name.to_string(),
                stack_id: format!("arn:aws:cloudformation:us-east-1:123456789012:stack/{name}/1"),
                status,
                last_transition_time: Utc::now() - ChronoDuration::minutes(age_minutes),
                status_reason: None,
            },
        );
    }

    pub fn add_events(&self, stack: &str, events: Vec<ResourceEvent>) {
        self.state()
            .events
            .entry(stack.to_string())
            .or_default()
            .extend(events);
    }

    pub fn add_cluster(&self, cluster: &str) {
        self.state().clusters.insert(cluster.to_string());
    }

    pub fn add_service(&self, cluster: &str, name: &str, running: u32, desired: u32) {
        let mut state = self.state();
        state.clusters.insert(cluster.to_string());
        state.services.insert(
            (cluster.to_string(), name.to_string()),
            ServiceSnapshot {
                name: name.to_string(),
                cluster: cluster.to_string(),
                status: "ACTIVE".to_string(),
                running_count: running,
                desired_count: desired,
                deployments: vec![],
            },
        );
    }

    pub fn put_service(&self, service: ServiceSnapshot) {
        let mut state = self.state();
        state.clusters.insert(service.cluster.clone());
        state
            .services
            .insert((service.cluster.clone(), service.name.clone()), service);
    }

    pub fn set_running(&self, cluster: &str, name: &str, running: u32) {
        if let Some(service) = self
            .state()
            .services
            .get_mut(&(cluster.to_string(), name.to_string()))
        {
            service.running_count = running;
        }
    }

    pub fn add_stopped_task(&self, service: &str, task: TaskFailure) {
        self.state()
            .stopped_tasks
            .entry(service.to_string())
            .or_default()
            .push(task);
    }

    pub fn add_target_group(&self, arn: &str, target_ids: &[&str]) {
        self.state().target_groups.insert(
            arn.to_string(),
            target_ids
                .iter()
                .map(|id| RegisteredTarget {
                    id: id.to_string(),
                    port: Some(8080),
                    health: Some("unhealthy".to_string()),
                })
                .collect(),
        );
    }

    pub fn add_policy(&self, name: &str, resource_id: &str) {
        self.state().policies.push(ScalingPolicy {
            name: name.to_string(),
            arn: format!("arn:aws:autoscaling:us-east-1:123456789012:scalingPolicy:1:resource/ecs/{resource_id}:policyName/{name}"),
            resource_id: resource_id.to_string(),
        });
    }

    pub fn add_scalable_target(&self, resource_id: &str) {
        self.state().scalable_targets.insert(
            resource_id.to_string(),
            ScalableTarget {
                resource_id: resource_id.to_string(),
                min_capacity: 1,
                max_capacity: 2,
            },
        );
    }

    /// Queue a failure for the next call of `operation`. Use
    /// `"operation:target"` to fail only calls against one target.
    pub fn fail_next(&self, operation: &str, kind: ErrorKind, message: &str) {
        self.state()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(BackendError::new(kind, operation, message));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.split(':').next() == Some(operation))
            .count()
    }

    /// Calls that change state, used to assert dry runs stay read-only
    pub fn mutating_calls(&self) -> Vec<String> {
        const MUTATIONS: &[&str] = &[
            "continue_rollback",
            "cancel_update",
            "delete_stack",
            "update_desired_count",
            "deregister_targets",
            "delete_scaling_policy",
            "register_scalable_target",
            "deregister_scalable_target",
        ];
        self.calls()
            .into_iter()
            .filter(|c| MUTATIONS.iter().any(|m| c.split(':').next() == Some(*m)))
            .collect()
    }

    pub fn stack_status(&self, name: &str) -> Option<StackStatus> {
        self.state().stacks.get(name).map(|s| s.status)
    }

    pub fn service(&self, cluster: &str, name: &str) -> Option<ServiceSnapshot> {
        self.state()
            .services
            .get(&(cluster.to_string(), name.to_string()))
            .cloned()
    }

    pub fn targets(&self, arn: &str) -> Vec<RegisteredTarget> {
        self.state().target_groups.get(arn).cloned().unwrap_or_default()
    }

    pub fn policy_names(&self) -> Vec<String> {
        self.state().policies.iter().map(|p| p.name.clone()).collect()
    }

    pub fn scalable_target(&self, resource_id: &str) -> Option<ScalableTarget> {
        self.state().scalable_targets.get(resource_id).cloned()
    }

    /// Record a call and pop any queued failure for it
    fn enter(&self, operation: &str, target: &str) -> BackendResult<()> {
        let mut state = self.state();
        state.calls.push(format!("{operation}:{target}"));

        let targeted = format!("{operation}:{target}");
        for key in [targeted.as_str(), operation] {
            if let Some(err) = state.failures.get_mut(key).and_then(|q| q.pop_front()) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn require_cluster(state: &FakeState, operation: &str, cluster: &str) -> BackendResult<()> {
        if state.clusters.contains(cluster) {
            Ok(())
        } else {
            Err(BackendError::not_found(operation, "Cluster not found."))
        }
    }
}

#[async_trait]
impl StackApi for FakeBackend {
    async fn list_stacks(&self) -> BackendResult<Vec<StackRecord>> {
        self.enter("list_stacks", "*")?;
        let mut stacks: Vec<_> = self.state().stacks.values().cloned().collect();
        stacks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stacks)
    }

    async fn describe_stack(&self, name: &str) -> BackendResult<StackRecord> {
        self.enter("describe_stack", name)?;
        self.state().stacks.get(name).cloned().ok_or_else(|| {
            BackendError::not_found("describe_stack", format!("Stack with id {name} does not exist"))
        })
    }

    async fn describe_stack_events(&self, name: &str) -> BackendResult<Vec<ResourceEvent>> {
        self.enter("describe_stack_events", name)?;
        let mut events = self.state().events.get(name).cloned().unwrap_or_default();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }

    async fn continue_rollback(&self, stack: &str, skip: &[String]) -> BackendResult<()> {
        self.enter("continue_rollback", stack)?;
        let mut state = self.state();
        state.calls.push(format!("skip:{}", skip.join(",")));
        let record = state.stacks.get_mut(stack).ok_or_else(|| {
            BackendError::not_found("continue_rollback", format!("Stack {stack} does not exist"))
        })?;
        record.status = match record.status {
            StackStatus::UpdateRollbackFailed | StackStatus::UpdateRollbackInProgress => {
                StackStatus::UpdateRollbackComplete
            }
            StackStatus::RollbackFailed | StackStatus::RollbackInProgress => {
                StackStatus::RollbackComplete
            }
            _ => {
                return Err(BackendError::new(
                    ErrorKind::Conflict,
                    "continue_rollback",
                    "ContinueUpdateRollback cannot be called from current stack status",
                ))
            }
        };
        record.last_transition_time = Utc::now();
        Ok(())
    }

    async fn cancel_update(&self, stack: &str) -> BackendResult<()> {
        self.enter("cancel_update", stack)?;
        let mut state = self.state();
        let record = state.stacks.get_mut(stack).ok_or_else(|| {
            BackendError::not_found("cancel_update", format!("Stack {stack} does not exist"))
        })?;
        if record.status != StackStatus::UpdateInProgress {
            return Err(BackendError::new(
                ErrorKind::Conflict,
                "cancel_update",
                "CancelUpdateStack cannot be called from current stack status",
            ));
        }
        record.status = StackStatus::UpdateRollbackInProgress;
        record.last_transition_time = Utc::now();
        Ok(())
    }

    async fn delete_stack(&self, stack: &str) -> BackendResult<()> {
        self.enter("delete_stack", stack)?;
        self.state().stacks.remove(stack);
        Ok(())
    }
}

#[async_trait]
impl ServiceApi for FakeBackend {
    async fn list_services(&self, cluster: &str) -> BackendResult<Vec<String>> {
        self.enter("list_services", cluster)?;
        let state = self.state();
        Self::require_cluster(&state, "list_services", cluster)?;
        let mut names: Vec<_> = state
            .services
            .keys()
            .filter(|(c, _)| c == cluster)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn describe_services(
        &self,
        cluster: &str,
        names: &[String],
    ) -> BackendResult<Vec<ServiceSnapshot>> {
        self.enter("describe_services", cluster)?;
        let state = self.state();
        Self::require_cluster(&state, "describe_services", cluster)?;
        Ok(names
            .iter()
            .filter_map(|name| state.services.get(&(cluster.to_string(), name.clone())).cloned())
            .collect())
    }

    async fn update_desired_count(
        &self,
        cluster: &str,
        service: &str,
        count: u32,
    ) -> BackendResult<()> {
        self.enter("update_desired_count", service)?;
        let mut state = self.state();
        Self::require_cluster(&state, "update_desired_count", cluster)?;
        let snapshot = state
            .services
            .get_mut(&(cluster.to_string(), service.to_string()))
            .ok_or_else(|| BackendError::not_found("update_desired_count", "Service not found."))?;
        snapshot.desired_count = count;
        snapshot.running_count = snapshot.running_count.min(count);
        Ok(())
    }

    async fn stopped_tasks(&self, _cluster: &str, service: &str) -> BackendResult<Vec<TaskFailure>> {
        self.enter("stopped_tasks", service)?;
        Ok(self.state().stopped_tasks.get(service).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl LoadBalancerApi for FakeBackend {
    async fn describe_target_health(
        &self,
        target_group: &str,
    ) -> BackendResult<Vec<RegisteredTarget>> {
        self.enter("describe_target_health", target_group)?;
        self.state()
            .target_groups
            .get(target_group)
            .cloned()
            .ok_or_else(|| BackendError::not_found("describe_target_health", "Target group not found"))
    }

    async fn deregister_targets(
        &self,
        target_group: &str,
        targets: &[RegisteredTarget],
    ) -> BackendResult<()> {
        self.enter("deregister_targets", target_group)?;
        if let Some(registered) = self.state().target_groups.get_mut(target_group) {
            registered.retain(|t| !targets.contains(t));
        }
        Ok(())
    }
}

#[async_trait]
impl ScalingApi for FakeBackend {
    async fn describe_scaling_policies(
        &self,
        resource_id: &str,
    ) -> BackendResult<Vec<ScalingPolicy>> {
        self.enter("describe_scaling_policies", resource_id)?;
        Ok(self
            .state()
            .policies
            .iter()
            .filter(|p| p.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn delete_scaling_policy(
        &self,
        policy_name: &str,
        resource_id: &str,
    ) -> BackendResult<()> {
        self.enter("delete_scaling_policy", policy_name)?;
        let mut state = self.state();
        let before = state.policies.len();
        state
            .policies
            .retain(|p| !(p.name == policy_name && p.resource_id == resource_id));
        if state.policies.len() == before {
            return Err(BackendError::not_found(
                "delete_scaling_policy",
                "No scaling policy found for service namespace",
            ));
        }
        Ok(())
    }

    async fn describe_scalable_targets(
        &self,
        resource_id: &str,
    ) -> BackendResult<Vec<ScalableTarget>> {
        self.enter("describe_scalable_targets", resource_id)?;
        Ok(self
            .state()
            .scalable_targets
            .get(resource_id)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn register_scalable_target(
        &self,
        resource_id: &str,
        min_capacity: u32,
        max_capacity: u32,
    ) -> BackendResult<()> {
        self.enter("register_scalable_target", resource_id)?;
        self.state().scalable_targets.insert(
            resource_id.to_string(),
            ScalableTarget {
                resource_id: resource_id.to_string(),
                min_capacity,
                max_capacity,
            },
        );
        Ok(())
    }

    async fn deregister_scalable_target(&self, resource_id: &str) -> BackendResult<()> {
        self.enter("deregister_scalable_target", resource_id)?;
        self.state().scalable_targets.remove(resource_id);
        Ok(())
    }
}

/// Build a session for environment `dev` backed by `backend`
pub fn session(backend: &Arc<FakeBackend>) -> Session {
    session_with(backend, EngineConfig::default())
}

pub fn session_with(backend: &Arc<FakeBackend>, config: EngineConfig) -> Session {
    Session::new("dev", config, Backends::from_single(backend.clone()))
}

/// A resource event `age_minutes` old
pub fn event(
    logical_id: &str,
    resource_type: &str,
    status: &str,
    age_minutes: i64,
) -> ResourceEvent {
    ResourceEvent {
        logical_id: logical_id.to_string(),
        resource_type: resource_type.to_string(),
        physical_id: None,
        status: status.to_string(),
        timestamp: Utc::now() - ChronoDuration::minutes(age_minutes),
        reason: None,
    }
}
