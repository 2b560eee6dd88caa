//! Resolution of owning services from resource identifiers
//!
//! Physical ids are tried first; when a resource never got one the owning
//! service is derived from the logical id by naming convention, e.g.
//! `ApiGatewayCpuScalingPolicy` -> component `api-gateway`.

use crate::models::ResourceRef;
use crate::session::Session;

/// Suffixes stripped from autoscaling logical ids, longest first
const AUTOSCALING_SUFFIXES: &[&str] = &[
    "RequestCountScalingPolicy",
    "MemoryScalingPolicy",
    "CpuScalingPolicy",
    "AutoScalingTarget",
    "ScalableTarget",
    "ScalingPolicy",
    "ScalingTarget",
];

/// A workload service and the cluster it runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDimension {
    pub cluster: String,
    pub service: String,
}

impl ServiceDimension {
    /// Autoscaling resource id of the service
    pub fn resource_id(&self) -> String {
        format!("service/{}/{}", self.cluster, self.service)
    }

    /// Parse `service/<cluster>/<service>`
    pub fn from_resource_id(resource_id: &str) -> Option<Self> {
        let mut parts = resource_id.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("service"), Some(cluster), Some(service), None)
                if !cluster.is_empty() && !service.is_empty() =>
            {
                Some(Self {
                    cluster: cluster.to_string(),
                    service: service.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Cluster and service addressed by a service resource's physical id.
///
/// Accepts a full service ARN (`...:service/<cluster>/<name>`), the legacy
/// ARN form without a cluster, or a bare service name.
pub fn service_from_physical_id(physical_id: &str, default_cluster: &str) -> Option<ServiceDimension> {
    let path = match physical_id.rsplit_once(":service/") {
        Some((_, path)) => path,
        None => physical_id,
    };

    let mut parts = path.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(cluster), Some(service)) => Some(ServiceDimension {
            cluster: cluster.to_string(),
            service: service.to_string(),
        }),
        (Some(service), None) => Some(ServiceDimension {
            cluster: default_cluster.to_string(),
            service: service.to_string(),
        }),
        _ => None,
    }
}

/// Owning service of an autoscaling policy or scalable target
pub fn scaling_dimension(resource: &ResourceRef, session: &Session) -> Option<ServiceDimension> {
    resource
        .physical_id
        .as_deref()
        .and_then(dimension_from_physical_id)
        .or_else(|| dimension_from_logical_id(&resource.logical_id, session))
}

/// Scalable targets use `service/c/s|dimension|namespace`; scaling policies
/// use an ARN containing `resource/ecs/service/c/s:policyName/...`
fn dimension_from_physical_id(physical_id: &str) -> Option<ServiceDimension> {
    if let Some(resource_id) = physical_id.split('|').next() {
        if let Some(dimension) = ServiceDimension::from_resource_id(resource_id) {
            return Some(dimension);
        }
    }

    let (_, rest) = physical_id.split_once("resource/ecs/")?;
    let resource_id = rest.split(":policyName").next()?;
    ServiceDimension::from_resource_id(resource_id)
}

fn dimension_from_logical_id(logical_id: &str, session: &Session) -> Option<ServiceDimension> {
    let base = AUTOSCALING_SUFFIXES
        .iter()
        .find_map(|suffix| logical_id.strip_suffix(suffix))?;
    let base = base.strip_suffix("Service").unwrap_or(base);
    if base.is_empty() {
        return None;
    }

    let component = kebab_case(base);
    Some(ServiceDimension {
        cluster: session.cluster_name(),
        service: session.config.service_name(&session.environment, &component),
    })
}

/// `ApiGateway` -> `api-gateway`
fn kebab_case(pascal: &str) -> String {
    let mut out = String::with_capacity(pascal.len() + 4);
    for (i, ch) in pascal.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
