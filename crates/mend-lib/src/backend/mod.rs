//! Backend ports
//!
//! The engine talks to four external collaborators: the stack provisioning
//! API, the workload scheduler, the load balancer and the autoscaler. Each is
//! an async trait so the engine can run against the provider CLI adapter in
//! production and an in-memory fake in tests.

mod aws_cli;

pub use aws_cli::AwsCli;

use crate::error::BackendResult;
use crate::models::{
    RegisteredTarget, ResourceEvent, ScalableTarget, ScalingPolicy, ServiceSnapshot,
    StackRecord, TaskFailure,
};
use std::sync::Arc;

pub use async_trait::async_trait;

/// Infrastructure stack operations
#[async_trait]
pub trait StackApi: Send + Sync {
    /// List every live stack (deleted stacks excluded)
    async fn list_stacks(&self) -> BackendResult<Vec<StackRecord>>;

    /// Describe one stack; `NotFound` when it does not exist
    async fn describe_stack(&self, name: &str) -> BackendResult<StackRecord>;

    /// Resource event history, most recent first
    async fn describe_stack_events(&self, name: &str) -> BackendResult<Vec<ResourceEvent>>;

    async fn continue_rollback(&self, stack: &str, skip: &[String]) -> BackendResult<()>;

    async fn cancel_update(&self, stack: &str) -> BackendResult<()>;

    async fn delete_stack(&self, stack: &str) -> BackendResult<()>;
}

/// Workload scheduler operations
#[async_trait]
pub trait ServiceApi: Send + Sync {
    /// Service names in a cluster
    async fn list_services(&self, cluster: &str) -> BackendResult<Vec<String>>;

    /// Describe services; names the scheduler does not know are omitted
    async fn describe_services(
        &self,
        cluster: &str,
        names: &[String],
    ) -> BackendResult<Vec<ServiceSnapshot>>;

    async fn update_desired_count(
        &self,
        cluster: &str,
        service: &str,
        count: u32,
    ) -> BackendResult<()>;

    /// Recently stopped tasks for a service
    async fn stopped_tasks(&self, cluster: &str, service: &str) -> BackendResult<Vec<TaskFailure>>;
}

/// Load balancer target group operations
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    async fn describe_target_health(
        &self,
        target_group: &str,
    ) -> BackendResult<Vec<RegisteredTarget>>;

    async fn deregister_targets(
        &self,
        target_group: &str,
        targets: &[RegisteredTarget],
    ) -> BackendResult<()>;
}

/// Autoscaling operations scoped to a scalable resource id
/// (`service/<cluster>/<service>`)
#[async_trait]
pub trait ScalingApi: Send + Sync {
    async fn describe_scaling_policies(&self, resource_id: &str)
        -> BackendResult<Vec<ScalingPolicy>>;

    async fn delete_scaling_policy(&self, policy_name: &str, resource_id: &str)
        -> BackendResult<()>;

    async fn describe_scalable_targets(
        &self,
        resource_id: &str,
    ) -> BackendResult<Vec<ScalableTarget>>;

    async fn register_scalable_target(
        &self,
        resource_id: &str,
        min_capacity: u32,
        max_capacity: u32,
    ) -> BackendResult<()>;

    async fn deregister_scalable_target(&self, resource_id: &str) -> BackendResult<()>;
}

/// One handle per external collaborator
#[derive(Clone)]
pub struct Backends {
    pub stacks: Arc<dyn StackApi>,
    pub services: Arc<dyn ServiceApi>,
    pub load_balancers: Arc<dyn LoadBalancerApi>,
    pub scaling: Arc<dyn ScalingApi>,
}

impl Backends {
    /// Use one implementation for every port
    pub fn from_single<T>(backend: Arc<T>) -> Self
    where
        T: StackApi + ServiceApi + LoadBalancerApi + ScalingApi + 'static,
    {
        Self {
            stacks: backend.clone(),
            services: backend.clone(),
            load_balancers: backend.clone(),
            scaling: backend,
        }
    }
}
