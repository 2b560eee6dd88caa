//! Per-run context shared by every component

use crate::backend::Backends;
use crate::config::EngineConfig;
use crate::error::{BackendResult, ErrorKind};
use crate::observability::StructuredLogger;
use tracing::{debug, warn};

/// Explicit context for one invocation: which environment, how to reach the
/// backends and which thresholds to apply
#[derive(Clone)]
pub struct Session {
    pub environment: String,
    pub config: EngineConfig,
    pub backends: Backends,
    pub logger: StructuredLogger,
}

impl Session {
    pub fn new(environment: impl Into<String>, config: EngineConfig, backends: Backends) -> Self {
        let environment = environment.into();
        Self {
            logger: StructuredLogger::new(environment.clone()),
            environment,
            config,
            backends,
        }
    }

    pub fn cluster_name(&self) -> String {
        self.config.cluster_name(&self.environment)
    }

    /// Whether a stack belongs to this session's environment
    pub fn owns_stack(&self, stack_name: &str) -> bool {
        stack_name == self.environment
            || stack_name.starts_with(&self.config.stack_prefix(&self.environment))
    }

    /// Check that the stack backend is reachable with the configured
    /// credentials before any inspection starts.
    ///
    /// Transient, missing-resource and conflict errors are tolerated; the
    /// commands report those per stack. Anything else (expired or missing
    /// credentials, access denied, a broken provider CLI) is returned.
    pub async fn preflight(&self) -> BackendResult<()> {
        match self.backends.stacks.list_stacks().await {
            Ok(stacks) => {
                debug!(count = stacks.len(), "Stack backend reachable");
                Ok(())
            }
            Err(e) => match e.kind {
                ErrorKind::Transient
                | ErrorKind::Timeout
                | ErrorKind::NotFound
                | ErrorKind::Conflict
                | ErrorKind::NoOp => {
                    warn!(error = %e, "Preflight check degraded, continuing");
                    Ok(())
                }
                ErrorKind::Unfixable | ErrorKind::Other => Err(e),
            },
        }
    }
}
