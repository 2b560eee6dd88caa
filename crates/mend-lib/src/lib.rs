//! Deployment state reconciliation library
//!
//! This crate provides the core functionality for:
//! - Stuck stack detection from status and time in state
//! - Classification of the resources blocking a stack
//! - Type-specific remediation with dry-run support
//! - Rollback continuation with skip-lists
//! - Pre-deployment health gating and continuous deployment monitoring

pub mod backend;
pub mod classifier;
pub mod config;
pub mod continuation;
pub mod error;
pub mod fixer;
pub mod gate;
pub mod health;
pub mod inspector;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod remediation;
pub mod services;
pub mod session;

#[cfg(test)]
mod testing;

pub use backend::{AwsCli, Backends};
pub use config::EngineConfig;
pub use error::{BackendError, BackendResult, ConfigError, ErrorKind};
pub use fixer::{FixOptions, FixReport, StuckStackFixer};
pub use gate::{DeploymentHealthGate, GateOptions};
pub use health::{HealthVerdict, Issue, IssueSubject, Severity};
pub use inspector::{InspectOptions, InspectionReport, StackStateInspector};
pub use models::*;
pub use monitor::{DeploymentMonitor, DeploymentStatus, OverallStatus};
pub use observability::StructuredLogger;
pub use remediation::RemediationDispatcher;
pub use session::Session;
