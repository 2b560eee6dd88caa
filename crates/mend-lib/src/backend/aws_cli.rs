//! Provider CLI adapter
//!
//! Implements every backend port by invoking the provider command line tool
//! with `--output json` and decoding stdout. Failures are turned into
//! [`BackendError`]s through the shared classifier, so no caller ever sees
//! raw provider text decide control flow.

use super::{async_trait, LoadBalancerApi, ScalingApi, ServiceApi, StackApi};
use crate::error::{parse_provider_error, BackendError, BackendResult, ErrorKind};
use crate::models::{
    RegisteredTarget, ResourceEvent, ScalableTarget, ScalingPolicy, ServiceDeployment,
    ServiceSnapshot, StackRecord, StackStatus, TaskFailure,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

const SCALABLE_DIMENSION: &str = "ecs:service:DesiredCount";
const SERVICE_NAMESPACE: &str = "ecs";
const DESCRIBE_SERVICES_BATCH: usize = 10;
const MAX_STACK_EVENTS: &str = "100";
const MAX_STOPPED_TASKS: usize = 10;

/// Backend implementation driven by the provider CLI
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    region: Option<String>,
    profile: Option<String>,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl AwsCli {
    pub fn new(region: Option<String>, profile: Option<String>) -> Self {
        Self {
            program: "aws".to_string(),
            region,
            profile,
        }
    }

    /// Override the executable, mostly useful for wrappers
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Run one provider operation and return raw stdout
    async fn run(&self, service: &str, operation: &str, args: &[String]) -> BackendResult<String> {
        let op_name = format!("{service} {operation}");
        let mut command = Command::new(&self.program);
        command.arg(service).arg(operation).args(args);
        command.args(["--output", "json"]);
        if let Some(region) = &self.region {
            command.args(["--region", region]);
        }
        if let Some(profile) = &self.profile {
            command.args(["--profile", profile]);
        }

        debug!(operation = %op_name, "Invoking provider CLI");

        let output = command.output().await.map_err(|e| {
            BackendError::new(
                ErrorKind::Other,
                op_name.clone(),
                format!("failed to launch {}: {e}", self.program),
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let (code, message) = parse_provider_error(&stderr);
            return Err(BackendError::from_provider(op_name, code.as_deref(), message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run an operation and decode its JSON output
    async fn run_json<T: DeserializeOwned>(
        &self,
        service: &str,
        operation: &str,
        args: &[String],
    ) -> BackendResult<T> {
        let stdout = self.run(service, operation, args).await?;
        serde_json::from_str(&stdout).map_err(|e| {
            BackendError::new(
                ErrorKind::Other,
                format!("{service} {operation}"),
                format!("unexpected response: {e}"),
            )
        })
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Last path segment of an ARN (`.../service/cluster/name` -> `name`)
fn arn_tail(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

// Provider response shapes

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackSummaries {
    #[serde(default)]
    stack_summaries: Vec<StackDescription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Stacks {
    #[serde(default)]
    stacks: Vec<StackDescription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackDescription {
    stack_id: String,
    stack_name: String,
    stack_status: StackStatus,
    creation_time: DateTime<Utc>,
    last_updated_time: Option<DateTime<Utc>>,
    deletion_time: Option<DateTime<Utc>>,
    stack_status_reason: Option<String>,
}

impl From<StackDescription> for StackRecord {
    fn from(d: StackDescription) -> Self {
        let last_transition_time = d
            .deletion_time
            .or(d.last_updated_time)
            .unwrap_or(d.creation_time);
        StackRecord {
            name: d.stack_name,
            stack_id: d.stack_id,
            status: d.stack_status,
            last_transition_time,
            status_reason: d.stack_status_reason,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackEvents {
    #[serde(default)]
    stack_events: Vec<StackEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackEvent {
    logical_resource_id: String,
    physical_resource_id: Option<String>,
    resource_type: String,
    resource_status: String,
    timestamp: DateTime<Utc>,
    resource_status_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceArns {
    #[serde(default)]
    service_arns: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Services {
    #[serde(default)]
    services: Vec<EcsService>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcsService {
    service_name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    running_count: u32,
    #[serde(default)]
    desired_count: u32,
    #[serde(default)]
    deployments: Vec<EcsDeployment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcsDeployment {
    id: String,
    status: String,
    rollout_state: Option<String>,
    rollout_state_reason: Option<String>,
    #[serde(default)]
    running_count: u32,
    #[serde(default)]
    desired_count: u32,
    failed_tasks: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskArns {
    #[serde(default)]
    task_arns: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tasks {
    #[serde(default)]
    tasks: Vec<EcsTask>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcsTask {
    task_arn: String,
    stopped_reason: Option<String>,
    #[serde(default)]
    containers: Vec<EcsContainer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcsContainer {
    reason: Option<String>,
    exit_code: Option<i32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TargetHealthDescriptions {
    #[serde(default)]
    target_health_descriptions: Vec<TargetHealthDescription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TargetHealthDescription {
    target: Target,
    target_health: Option<TargetHealth>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Target {
    id: String,
    port: Option<u16>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TargetHealth {
    state: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ScalingPolicies {
    #[serde(default)]
    scaling_policies: Vec<ProviderPolicy>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProviderPolicy {
    policy_name: String,
    #[serde(rename = "PolicyARN")]
    policy_arn: String,
    resource_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ScalableTargets {
    #[serde(default)]
    scalable_targets: Vec<ProviderScalableTarget>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProviderScalableTarget {
    resource_id: String,
    min_capacity: u32,
    max_capacity: u32,
}

#[async_trait]
impl StackApi for AwsCli {
    async fn list_stacks(&self) -> BackendResult<Vec<StackRecord>> {
        let response: StackSummaries = self.run_json("cloudformation", "list-stacks", &[]).await?;
        Ok(response
            .stack_summaries
            .into_iter()
            .filter(|s| s.stack_status != StackStatus::DeleteComplete)
            .map(StackRecord::from)
            .collect())
    }

    async fn describe_stack(&self, name: &str) -> BackendResult<StackRecord> {
        let response: Stacks = self
            .run_json("cloudformation", "describe-stacks", &args(["--stack-name", name]))
            .await?;
        response
            .stacks
            .into_iter()
            .next()
            .map(StackRecord::from)
            .ok_or_else(|| {
                BackendError::not_found("cloudformation describe-stacks", format!("stack {name}"))
            })
    }

    async fn describe_stack_events(&self, name: &str) -> BackendResult<Vec<ResourceEvent>> {
        let response: StackEvents = self
            .run_json(
                "cloudformation",
                "describe-stack-events",
                &args(["--stack-name", name, "--max-items", MAX_STACK_EVENTS]),
            )
            .await?;
        Ok(response
            .stack_events
            .into_iter()
            .map(|e| ResourceEvent {
                logical_id: e.logical_resource_id,
                resource_type: e.resource_type,
                physical_id: e.physical_resource_id.filter(|p| !p.is_empty()),
                status: e.resource_status,
                timestamp: e.timestamp,
                reason: e.resource_status_reason,
            })
            .collect())
    }

    async fn continue_rollback(&self, stack: &str, skip: &[String]) -> BackendResult<()> {
        let mut cli_args = args(["--stack-name", stack]);
        if !skip.is_empty() {
            cli_args.push("--resources-to-skip".to_string());
            cli_args.extend(skip.iter().cloned());
        }
        self.run("cloudformation", "continue-update-rollback", &cli_args)
            .await
            .map(|_| ())
    }

    async fn cancel_update(&self, stack: &str) -> BackendResult<()> {
        self.run("cloudformation", "cancel-update-stack", &args(["--stack-name", stack]))
            .await
            .map(|_| ())
    }

    async fn delete_stack(&self, stack: &str) -> BackendResult<()> {
        self.run("cloudformation", "delete-stack", &args(["--stack-name", stack]))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ServiceApi for AwsCli {
    async fn list_services(&self, cluster: &str) -> BackendResult<Vec<String>> {
        let response: ServiceArns = self
            .run_json("ecs", "list-services", &args(["--cluster", cluster]))
            .await?;
        Ok(response
            .service_arns
            .iter()
            .map(|arn| arn_tail(arn).to_string())
            .collect())
    }

    async fn describe_services(
        &self,
        cluster: &str,
        names: &[String],
    ) -> BackendResult<Vec<ServiceSnapshot>> {
        let mut snapshots = Vec::with_capacity(names.len());

        for chunk in names.chunks(DESCRIBE_SERVICES_BATCH) {
            let mut cli_args = args(["--cluster", cluster, "--services"]);
            cli_args.extend(chunk.iter().cloned());
            let response: Services = self.run_json("ecs", "describe-services", &cli_args).await?;

            snapshots.extend(response.services.into_iter().map(|s| ServiceSnapshot {
                name: s.service_name,
                cluster: cluster.to_string(),
                status: s.status,
                running_count: s.running_count,
                desired_count: s.desired_count,
                deployments: s
                    .deployments
                    .into_iter()
                    .map(|d| ServiceDeployment {
                        id: d.id,
                        status: d.status,
                        rollout_state: d.rollout_state,
                        rollout_state_reason: d.rollout_state_reason,
                        running_count: d.running_count,
                        desired_count: d.desired_count,
                        failed_tasks: d.failed_tasks,
                    })
                    .collect(),
            }));
        }

        Ok(snapshots)
    }

    async fn update_desired_count(
        &self,
        cluster: &str,
        service: &str,
        count: u32,
    ) -> BackendResult<()> {
        let count = count.to_string();
        self.run(
            "ecs",
            "update-service",
            &args(["--cluster", cluster, "--service", service, "--desired-count", &count]),
        )
        .await
        .map(|_| ())
    }

    async fn stopped_tasks(&self, cluster: &str, service: &str) -> BackendResult<Vec<TaskFailure>> {
        let listed: TaskArns = self
            .run_json(
                "ecs",
                "list-tasks",
                &args([
                    "--cluster",
                    cluster,
                    "--service-name",
                    service,
                    "--desired-status",
                    "STOPPED",
                ]),
            )
            .await?;

        if listed.task_arns.is_empty() {
            return Ok(Vec::new());
        }

        let mut cli_args = args(["--cluster", cluster, "--tasks"]);
        cli_args.extend(listed.task_arns.into_iter().take(MAX_STOPPED_TASKS));
        let described: Tasks = self.run_json("ecs", "describe-tasks", &cli_args).await?;

        Ok(described
            .tasks
            .into_iter()
            .map(|t| TaskFailure {
                task_id: arn_tail(&t.task_arn).to_string(),
                stopped_reason: t.stopped_reason,
                container_reasons: t.containers.iter().filter_map(|c| c.reason.clone()).collect(),
                exit_codes: t.containers.iter().filter_map(|c| c.exit_code).collect(),
            })
            .collect())
    }
}

#[async_trait]
impl LoadBalancerApi for AwsCli {
    async fn describe_target_health(
        &self,
        target_group: &str,
    ) -> BackendResult<Vec<RegisteredTarget>> {
        let response: TargetHealthDescriptions = self
            .run_json(
                "elbv2",
                "describe-target-health",
                &args(["--target-group-arn", target_group]),
            )
            .await?;
        Ok(response
            .target_health_descriptions
            .into_iter()
            .map(|d| RegisteredTarget {
                id: d.target.id,
                port: d.target.port,
                health: d.target_health.and_then(|h| h.state),
            })
            .collect())
    }

    async fn deregister_targets(
        &self,
        target_group: &str,
        targets: &[RegisteredTarget],
    ) -> BackendResult<()> {
        let mut cli_args = args(["--target-group-arn", target_group, "--targets"]);
        cli_args.extend(targets.iter().map(|t| match t.port {
            Some(port) => format!("Id={},Port={}", t.id, port),
            None => format!("Id={}", t.id),
        }));
        self.run("elbv2", "deregister-targets", &cli_args)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ScalingApi for AwsCli {
    async fn describe_scaling_policies(
        &self,
        resource_id: &str,
    ) -> BackendResult<Vec<ScalingPolicy>> {
        let response: ScalingPolicies = self
            .run_json(
                "application-autoscaling",
                "describe-scaling-policies",
                &args(["--service-namespace", SERVICE_NAMESPACE, "--resource-id", resource_id]),
            )
            .await?;
        Ok(response
            .scaling_policies
            .into_iter()
            .map(|p| ScalingPolicy {
                name: p.policy_name,
                arn: p.policy_arn,
                resource_id: p.resource_id,
            })
            .collect())
    }

    async fn delete_scaling_policy(
        &self,
        policy_name: &str,
        resource_id: &str,
    ) -> BackendResult<()> {
        self.run(
            "application-autoscaling",
            "delete-scaling-policy",
            &args([
                "--service-namespace",
                SERVICE_NAMESPACE,
                "--policy-name",
                policy_name,
                "--resource-id",
                resource_id,
                "--scalable-dimension",
                SCALABLE_DIMENSION,
            ]),
        )
        .await
        .map(|_| ())
    }

    async fn describe_scalable_targets(
        &self,
        resource_id: &str,
    ) -> BackendResult<Vec<ScalableTarget>> {
        let response: ScalableTargets = self
            .run_json(
                "application-autoscaling",
                "describe-scalable-targets",
                &args(["--service-namespace", SERVICE_NAMESPACE, "--resource-ids", resource_id]),
            )
            .await?;
        Ok(response
            .scalable_targets
            .into_iter()
            .map(|t| ScalableTarget {
                resource_id: t.resource_id,
                min_capacity: t.min_capacity,
                max_capacity: t.max_capacity,
            })
            .collect())
    }

    async fn register_scalable_target(
        &self,
        resource_id: &str,
        min_capacity: u32,
        max_capacity: u32,
    ) -> BackendResult<()> {
        let min = min_capacity.to_string();
        let max = max_capacity.to_string();
        self.run(
            "application-autoscaling",
            "register-scalable-target",
            &args([
                "--service-namespace",
                SERVICE_NAMESPACE,
                "--resource-id",
                resource_id,
                "--scalable-dimension",
                SCALABLE_DIMENSION,
                "--min-capacity",
                &min,
                "--max-capacity",
                &max,
            ]),
        )
        .await
        .map(|_| ())
    }

    async fn deregister_scalable_target(&self, resource_id: &str) -> BackendResult<()> {
        self.run(
            "application-autoscaling",
            "deregister-scalable-target",
            &args([
                "--service-namespace",
                SERVICE_NAMESPACE,
                "--resource-id",
                resource_id,
                "--scalable-dimension",
                SCALABLE_DIMENSION,
            ]),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arn_tail() {
        assert_eq!(
            arn_tail("arn:aws:ecs:us-east-1:123456789012:service/dev-cluster/api"),
            "api"
        );
        assert_eq!(arn_tail("plain-name"), "plain-name");
    }

    #[test]
    fn test_stack_description_uses_latest_transition() {
        let json = r#"{
            "Stacks": [{
                "StackId": "arn:aws:cloudformation:us-east-1:1:stack/dev-compute/abc",
                "StackName": "dev-compute",
                "StackStatus": "UPDATE_ROLLBACK_IN_PROGRESS",
                "CreationTime": "2024-01-01T10:00:00.000Z",
                "LastUpdatedTime": "2024-03-01T10:00:00.000Z"
            }]
        }"#;
        let parsed: Stacks = serde_json::from_str(json).unwrap();
        let record = StackRecord::from(parsed.stacks.into_iter().next().unwrap());

        assert_eq!(record.name, "dev-compute");
        assert_eq!(record.status, StackStatus::UpdateRollbackInProgress);
        assert_eq!(record.last_transition_time.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_service_response_parsing() {
        let json = r#"{
            "services": [{
                "serviceName": "api",
                "status": "ACTIVE",
                "runningCount": 0,
                "desiredCount": 3,
                "deployments": [{
                    "id": "ecs-svc/1",
                    "status": "PRIMARY",
                    "rolloutState": "IN_PROGRESS",
                    "runningCount": 0,
                    "desiredCount": 3
                }]
            }],
            "failures": []
        }"#;
        let parsed: Services = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.services.len(), 1);
        assert_eq!(parsed.services[0].deployments[0].rollout_state.as_deref(), Some("IN_PROGRESS"));
    }

    #[test]
    fn test_scaling_policy_arn_field() {
        let json = r#"{"ScalingPolicies": [{
            "PolicyName": "api-cpu",
            "PolicyARN": "arn:aws:autoscaling:policy/api-cpu",
            "ResourceId": "service/dev-cluster/api"
        }]}"#;
        let parsed: ScalingPolicies = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.scaling_policies[0].policy_arn, "arn:aws:autoscaling:policy/api-cpu");
    }
}
