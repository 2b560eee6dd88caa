//! Engine configuration
//!
//! Every threshold and timing constant used by the engine lives here so it
//! can be tuned per environment from a TOML file or `STACKMEND_*`
//! environment variables.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Age before a create/update/rollback in progress counts as stuck
    #[serde(default = "default_in_progress_threshold")]
    pub in_progress_threshold_mins: i64,

    /// Age before a delete in progress counts as stuck
    #[serde(default = "default_delete_threshold")]
    pub delete_threshold_mins: i64,

    /// Age before post-update cleanup counts as stuck
    #[serde(default = "default_cleanup_threshold")]
    pub cleanup_threshold_mins: i64,

    /// Age before an in-progress resource event counts as blocking
    #[serde(default = "default_resource_in_progress")]
    pub resource_in_progress_mins: i64,

    /// Age before an in-progress autoscaling resource counts as blocking
    #[serde(default = "default_fragile_resource")]
    pub fragile_resource_mins: i64,

    /// How long after a completed rollback services get leniency
    #[serde(default = "default_recent_rollback_window")]
    pub recent_rollback_window_mins: i64,

    /// Wait before re-checking recovering services
    #[serde(default = "default_recovery_grace")]
    pub recovery_grace_secs: u64,

    #[serde(default = "default_stabilization_timeout")]
    pub stabilization_timeout_secs: u64,

    #[serde(default = "default_stabilization_interval")]
    pub stabilization_interval_secs: u64,

    /// Pause after scaling a service to zero
    #[serde(default = "default_service_drain_wait")]
    pub service_drain_wait_secs: u64,

    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    #[serde(default = "default_monitor_duration")]
    pub monitor_duration_secs: u64,

    /// Capacity used when recreating a missing scalable target
    #[serde(default = "default_min_capacity")]
    pub scalable_target_min_capacity: u32,

    #[serde(default = "default_max_capacity")]
    pub scalable_target_max_capacity: u32,

    /// Attempts allowed for the conflict -> delete -> recreate cycle
    #[serde(default = "default_conflict_retry_budget")]
    pub conflict_retry_budget: u32,

    /// Cluster name, `{environment}` is substituted
    #[serde(default = "default_cluster_template")]
    pub cluster_template: String,

    /// Stack name prefix, `{environment}` is substituted
    #[serde(default = "default_stack_prefix_template")]
    pub stack_prefix_template: String,

    /// Service name derived from a resource's logical id,
    /// `{environment}` and `{component}` are substituted
    #[serde(default = "default_service_name_template")]
    pub service_name_template: String,
}

fn default_in_progress_threshold() -> i64 {
    30
}

fn default_delete_threshold() -> i64 {
    45
}

fn default_cleanup_threshold() -> i64 {
    10
}

fn default_resource_in_progress() -> i64 {
    10
}

fn default_fragile_resource() -> i64 {
    5
}

fn default_recent_rollback_window() -> i64 {
    10
}

fn default_recovery_grace() -> u64 {
    120
}

fn default_stabilization_timeout() -> u64 {
    20 * 60
}

fn default_stabilization_interval() -> u64 {
    30
}

fn default_service_drain_wait() -> u64 {
    10
}

fn default_monitor_interval() -> u64 {
    30
}

fn default_monitor_duration() -> u64 {
    30 * 60
}

fn default_min_capacity() -> u32 {
    1
}

fn default_max_capacity() -> u32 {
    4
}

fn default_conflict_retry_budget() -> u32 {
    3
}

fn default_cluster_template() -> String {
    "{environment}-cluster".to_string()
}

fn default_stack_prefix_template() -> String {
    "{environment}-".to_string()
}

fn default_service_name_template() -> String {
    "{environment}-{component}".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            in_progress_threshold_mins: default_in_progress_threshold(),
            delete_threshold_mins: default_delete_threshold(),
            cleanup_threshold_mins: default_cleanup_threshold(),
            resource_in_progress_mins: default_resource_in_progress(),
            fragile_resource_mins: default_fragile_resource(),
            recent_rollback_window_mins: default_recent_rollback_window(),
            recovery_grace_secs: default_recovery_grace(),
            stabilization_timeout_secs: default_stabilization_timeout(),
            stabilization_interval_secs: default_stabilization_interval(),
            service_drain_wait_secs: default_service_drain_wait(),
            monitor_interval_secs: default_monitor_interval(),
            monitor_duration_secs: default_monitor_duration(),
            scalable_target_min_capacity: default_min_capacity(),
            scalable_target_max_capacity: default_max_capacity(),
            conflict_retry_budget: default_conflict_retry_budget(),
            cluster_template: default_cluster_template(),
            stack_prefix_template: default_stack_prefix_template(),
            service_name_template: default_service_name_template(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional file and the environment.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("STACKMEND").try_parsing(true))
            .build()?;

        let loaded: EngineConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scalable_target_min_capacity > self.scalable_target_max_capacity {
            return Err(ConfigError::Invalid(format!(
                "scalable_target_min_capacity ({}) exceeds scalable_target_max_capacity ({})",
                self.scalable_target_min_capacity, self.scalable_target_max_capacity
            )));
        }
        if self.stabilization_interval_secs == 0 || self.monitor_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cluster_name(&self, environment: &str) -> String {
        self.cluster_template.replace("{environment}", environment)
    }

    pub fn stack_prefix(&self, environment: &str) -> String {
        self.stack_prefix_template.replace("{environment}", environment)
    }

    pub fn service_name(&self, environment: &str, component: &str) -> String {
        self.service_name_template
            .replace("{environment}", environment)
            .replace("{component}", component)
    }

    pub fn recovery_grace(&self) -> Duration {
        Duration::from_secs(self.recovery_grace_secs)
    }

    pub fn stabilization_timeout(&self) -> Duration {
        Duration::from_secs(self.stabilization_timeout_secs)
    }

    pub fn stabilization_interval(&self) -> Duration {
        Duration::from_secs(self.stabilization_interval_secs)
    }

    pub fn service_drain_wait(&self) -> Duration {
        Duration::from_secs(self.service_drain_wait_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn monitor_duration(&self) -> Duration {
        Duration::from_secs(self.monitor_duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.in_progress_threshold_mins, 30);
        assert_eq!(config.delete_threshold_mins, 45);
        assert_eq!(config.cleanup_threshold_mins, 10);
        assert_eq!(config.recent_rollback_window_mins, 10);
        assert_eq!(config.recovery_grace(), Duration::from_secs(120));
        assert_eq!(config.stabilization_timeout(), Duration::from_secs(1200));
    }

    #[test]
    fn test_templates() {
        let config = EngineConfig::default();
        assert_eq!(config.cluster_name("staging"), "staging-cluster");
        assert_eq!(config.stack_prefix("staging"), "staging-");
        assert_eq!(config.service_name("staging", "api"), "staging-api");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "recovery_grace_secs = 30").unwrap();
        writeln!(file, "cluster_template = \"apps-{{environment}}\"").unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.recovery_grace_secs, 30);
        assert_eq!(config.cluster_name("prod"), "apps-prod");
        assert_eq!(config.delete_threshold_mins, 45);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = EngineConfig::load(Some(Path::new("/nonexistent/stackmend.toml"))).unwrap();
        assert_eq!(config.in_progress_threshold_mins, 30);
    }

    #[test]
    fn test_invalid_capacity_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "scalable_target_min_capacity = 5").unwrap();
        writeln!(file, "scalable_target_max_capacity = 2").unwrap();

        assert!(EngineConfig::load(Some(file.path())).is_err());
    }
}
