//! Workload service health checks
//!
//! Reads every service of the environment's cluster and turns its task
//! counts into gate issues. A service with desired tasks but none running is
//! critical, unless the caller is inside a post-rollback recovery window, in
//! which case it is only a warning.

use crate::error::BackendResult;
use crate::health::{Issue, IssueSubject};
use crate::models::ServiceSnapshot;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const SERVICE_DOWN: &str = "service completely down";
pub const SERVICE_RECOVERING: &str = "recovering";

/// Services read in one check and the issues derived from them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceCheckReport {
    pub services: Vec<ServiceSnapshot>,
    pub issues: Vec<Issue>,
}

impl ServiceCheckReport {
    /// Names of services that are down, whatever severity they were given
    pub fn down_services(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|s| s.is_active() && s.is_down())
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn has_recovering(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.message.starts_with(SERVICE_RECOVERING))
    }
}

pub struct ServiceHealthCheck<'a> {
    session: &'a Session,
}

impl<'a> ServiceHealthCheck<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Current snapshot of every service in the environment's cluster
    pub async fn snapshot(&self) -> BackendResult<Vec<ServiceSnapshot>> {
        let cluster = self.session.cluster_name();
        let api = &self.session.backends.services;

        let names = api.list_services(&cluster).await?;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        debug!(cluster = %cluster, count = names.len(), "Describing services");
        api.describe_services(&cluster, &names).await
    }

    /// Check all services. With `lenient`, a service at zero running tasks
    /// is reported as recovering instead of down.
    pub async fn check(&self, lenient: bool) -> ServiceCheckReport {
        let cluster = self.session.cluster_name();

        let services = match self.snapshot().await {
            Ok(services) => services,
            Err(e) if e.is_not_found() => {
                warn!(cluster = %cluster, "Cluster not found, no services to check");
                return ServiceCheckReport {
                    services: Vec::new(),
                    issues: vec![Issue::warning(
                        IssueSubject::Service,
                        cluster.clone(),
                        format!("cluster {cluster} not found"),
                    )],
                };
            }
            Err(e) => {
                warn!(cluster = %cluster, error = %e, "Failed to read services");
                return ServiceCheckReport {
                    services: Vec::new(),
                    issues: vec![Issue::critical(
                        IssueSubject::Inspection,
                        cluster,
                        format!("unable to verify service health: {e}"),
                    )],
                };
            }
        };

        let issues = services
            .iter()
            .filter_map(|service| assess(service, lenient))
            .collect();

        ServiceCheckReport { services, issues }
    }
}

/// Issue for one service, if any
pub fn assess(service: &ServiceSnapshot, lenient: bool) -> Option<Issue> {
    if !service.is_active() {
        return None;
    }

    let counts = format!("{}/{} tasks running", service.running_count, service.desired_count);
    if service.is_down() {
        return Some(if lenient {
            Issue::warning(
                IssueSubject::Service,
                &service.name,
                format!("{SERVICE_RECOVERING}: {counts} after recent rollback"),
            )
        } else {
            Issue::critical(
                IssueSubject::Service,
                &service.name,
                format!("{SERVICE_DOWN}: {counts}"),
            )
        });
    }

    if service.is_degraded() {
        return Some(Issue::warning(
            IssueSubject::Service,
            &service.name,
            format!("degraded: {counts}"),
        ));
    }

    if service.is_deploying() {
        return Some(Issue::info(
            IssueSubject::Service,
            &service.name,
            "deployment in progress",
        ));
    }

    None
}
