//! Type-specific remediation of stuck resources
//!
//! Each stuck resource is mapped to one corrective action:
//! - workload service: scale to zero
//! - target group: deregister every target
//! - scaling policy: delete the policies owned by the service
//! - scalable target: recreate it when the backend lost it
//! - task definition and anything else: unfixable, to be skipped
//!
//! Every strategy is idempotent; running it against an already remediated
//! resource reports `fixed` again. Dry runs issue no backend calls.

mod conflict;
mod naming;


pub use conflict::ConflictResolver;
pub use naming::{scaling_dimension, service_from_physical_id, ServiceDimension};

use crate::error::{BackendError, ErrorKind};
use crate::models::{RemediationResult, ResourceKind, ResourceRef, StuckResource};
use crate::session::Session;
use tracing::debug;

pub const SERVICE_MISSING: &str = "referenced cluster/service does not exist";
pub const NO_RUNNING_STATE: &str = "has no running state, should be skipped during rollback";
pub const NO_FIX_AVAILABLE: &str = "no fix available for this type";
pub const CREATED_SCALABLE_TARGET: &str = "created missing scalable target";

/// Maps stuck resources to corrective actions and runs them
pub struct RemediationDispatcher<'a> {
    session: &'a Session,
    dry_run: bool,
}

impl<'a> RemediationDispatcher<'a> {
    pub fn new(session: &'a Session, dry_run: bool) -> Self {
        Self { session, dry_run }
    }

    /// Remediate resources one at a time in the given (priority) order
    pub async fn remediate_all(&self, stack: &str, resources: &[StuckResource]) -> Vec<RemediationResult> {
        let mut results = Vec::with_capacity(resources.len());
        for stuck in resources {
            let result = self.remediate(stuck).await;
            self.session.logger.log_remediation(stack, &result);
            results.push(result);
        }
        results
    }

    pub async fn remediate(&self, stuck: &StuckResource) -> RemediationResult {
        let resource = &stuck.resource;
        let kind = resource.kind();
        debug!(logical_id = %resource.logical_id, ?kind, dry_run = self.dry_run, "Remediating resource");

        if self.dry_run {
            return dry_run_result(resource, kind);
        }

        match kind {
            ResourceKind::Service => self.scale_service_to_zero(resource).await,
            ResourceKind::TargetGroup => self.drain_target_group(resource).await,
            ResourceKind::ScalingPolicy => self.delete_scaling_policies(resource).await,
            ResourceKind::ScalableTarget => self.reconcile_scalable_target(resource).await,
            ResourceKind::TaskDefinition => RemediationResult::unfixable(resource, NO_RUNNING_STATE),
            ResourceKind::Stack | ResourceKind::Other => {
                RemediationResult::unfixable(resource, NO_FIX_AVAILABLE)
            }
        }
    }

    async fn scale_service_to_zero(&self, resource: &ResourceRef) -> RemediationResult {
        let cluster = self.session.cluster_name();
        let Some(dimension) = resource
            .physical_id
            .as_deref()
            .and_then(|id| service_from_physical_id(id, &cluster))
        else {
            return RemediationResult::unfixable(resource, SERVICE_MISSING);
        };

        match self
            .session
            .backends
            .services
            .update_desired_count(&dimension.cluster, &dimension.service, 0)
            .await
        {
            Ok(()) => {
                tokio::time::sleep(self.session.config.service_drain_wait()).await;
                RemediationResult::fixed(
                    resource,
                    format!("scaled {} to 0 desired tasks", dimension.service),
                )
            }
            Err(e) if e.is_no_op() => RemediationResult::fixed(resource, "service already at 0"),
            Err(e) if e.is_not_found() => RemediationResult::unfixable(resource, SERVICE_MISSING),
            Err(e) => failure(resource, &e),
        }
    }

    async fn drain_target_group(&self, resource: &ResourceRef) -> RemediationResult {
        let Some(target_group) = resource.physical_id.as_deref() else {
            return RemediationResult::unfixable(resource, "target group was never created");
        };
        let lb = &self.session.backends.load_balancers;

        let targets = match lb.describe_target_health(target_group).await {
            Ok(targets) => targets,
            Err(e) if e.is_not_found() => {
                return RemediationResult::fixed(resource, "target group already deleted")
            }
            Err(e) => return failure(resource, &e),
        };

        if targets.is_empty() {
            return RemediationResult::fixed(resource, "no registered targets");
        }

        match lb.deregister_targets(target_group, &targets).await {
            Ok(()) => RemediationResult::fixed(
                resource,
                format!("deregistered {} targets", targets.len()),
            ),
            Err(e) if e.is_not_found() || e.is_no_op() => {
                RemediationResult::fixed(resource, "targets already deregistered")
            }
            Err(e) => failure(resource, &e),
        }
    }

    async fn delete_scaling_policies(&self, resource: &ResourceRef) -> RemediationResult {
        let Some(dimension) = scaling_dimension(resource, self.session) else {
            return RemediationResult::unfixable(
                resource,
                "cannot resolve owning service for scaling policy",
            );
        };
        let resource_id = dimension.resource_id();
        let scaling = &self.session.backends.scaling;

        let policies = match scaling.describe_scaling_policies(&resource_id).await {
            Ok(policies) => policies,
            Err(e) if e.is_not_found() || e.is_no_op() => {
                return RemediationResult::fixed(resource, "already deleted")
            }
            Err(e) => return failure(resource, &e),
        };

        let logical = resource.logical_id.to_ascii_lowercase();
        let matching: Vec<_> = policies
            .iter()
            .filter(|p| {
                resource
                    .physical_id
                    .as_deref()
                    .is_some_and(|id| id == p.arn || id == p.name)
                    || p.name.to_ascii_lowercase().contains(&logical)
            })
            .collect();

        if matching.is_empty() {
            return RemediationResult::fixed(resource, "already deleted");
        }

        for policy in &matching {
            match scaling.delete_scaling_policy(&policy.name, &resource_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() || e.is_no_op() => {}
                Err(e) => return failure(resource, &e),
            }
        }

        RemediationResult::fixed(
            resource,
            format!("deleted {} scaling policies on {resource_id}", matching.len()),
        )
    }

    async fn reconcile_scalable_target(&self, resource: &ResourceRef) -> RemediationResult {
        let Some(dimension) = scaling_dimension(resource, self.session) else {
            return RemediationResult::unfixable(
                resource,
                "cannot resolve owning service for scalable target",
            );
        };
        let resource_id = dimension.resource_id();
        let backends = &self.session.backends;

        match backends.scaling.describe_scalable_targets(&resource_id).await {
            Ok(targets) if !targets.is_empty() => {
                return RemediationResult::fixed(resource, "already consistent")
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return failure(resource, &e),
        }

        let services = match backends
            .services
            .describe_services(&dimension.cluster, std::slice::from_ref(&dimension.service))
            .await
        {
            Ok(services) => services,
            Err(e) if e.is_not_found() => {
                return RemediationResult::unfixable(resource, "owning service does not exist")
            }
            Err(e) => return failure(resource, &e),
        };
        if !services.iter().any(|s| s.is_active()) {
            return RemediationResult::unfixable(resource, "owning service does not exist");
        }

        let config = &self.session.config;
        let resolver = ConflictResolver::new(backends.scaling.as_ref(), config.conflict_retry_budget);
        match resolver
            .register(
                &resource_id,
                config.scalable_target_min_capacity,
                config.scalable_target_max_capacity,
            )
            .await
        {
            Ok(()) => RemediationResult::fixed(resource, CREATED_SCALABLE_TARGET),
            Err(e) => failure(resource, &e),
        }
    }
}

fn dry_run_result(resource: &ResourceRef, kind: ResourceKind) -> RemediationResult {
    match kind {
        ResourceKind::Service => {
            RemediationResult::failed(resource, "Dry run: would scale service to 0 desired tasks")
        }
        ResourceKind::TargetGroup => {
            RemediationResult::failed(resource, "Dry run: would deregister all targets")
        }
        ResourceKind::ScalingPolicy => {
            RemediationResult::failed(resource, "Dry run: would delete scaling policies")
        }
        ResourceKind::ScalableTarget => RemediationResult::failed(
            resource,
            "Dry run: would verify and recreate scalable target",
        ),
        ResourceKind::TaskDefinition => {
            RemediationResult::unfixable(resource, format!("Dry run: {NO_RUNNING_STATE}"))
        }
        ResourceKind::Stack | ResourceKind::Other => {
            RemediationResult::unfixable(resource, format!("Dry run: {NO_FIX_AVAILABLE}"))
        }
    }
}

/// A backend failure during remediation; never marks the resource unfixable
fn failure(resource: &ResourceRef, err: &BackendError) -> RemediationResult {
    let reason = match err.kind {
        ErrorKind::Transient => format!("transient backend error, retry later: {err}"),
        _ => format!("remediation failed: {err}"),
    };
    RemediationResult::failed(resource, reason)
}
