//! Health verdict types
//!
//! Issues found by the gate are tagged with a [`Severity`]; the verdict and
//! the process exit code are both derived from the worst severity present.

use serde::{Deserialize, Serialize};

/// Severity of a reported issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational only
    Info,
    /// Degraded or recovering, does not block deployment
    Warning,
    /// Blocks deployment
    Critical,
}

impl Severity {
    /// Process exit code for this severity (0 ok, 1 critical, 2 warnings)
    pub fn exit_code(&self) -> i32 {
        match self {
            Severity::Info => 0,
            Severity::Warning => 2,
            Severity::Critical => 1,
        }
    }
}

/// What an issue is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSubject {
    Stack,
    Service,
    Inspection,
}

/// A single problem found while checking an environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub subject: IssueSubject,
    /// Stack or service name
    pub name: String,
    pub message: String,
}

impl Issue {
    pub fn critical(subject: IssueSubject, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            subject,
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn warning(subject: IssueSubject, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            subject,
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn info(subject: IssueSubject, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            subject,
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Root output of the pre-deployment health gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub environment: String,
    pub healthy: bool,
    pub can_proceed: bool,
    pub issues: Vec<Issue>,
    /// Actions taken or recommended, in order
    pub actions: Vec<String>,
}

impl HealthVerdict {
    /// Build a verdict from the remaining issues
    pub fn from_issues(environment: impl Into<String>, issues: Vec<Issue>, actions: Vec<String>) -> Self {
        let worst = Self::compute_severity(&issues);
        Self {
            environment: environment.into(),
            healthy: worst == Severity::Info,
            can_proceed: worst != Severity::Critical,
            issues,
            actions,
        }
    }

    /// Worst severity across issues, `Info` when there are none
    pub fn compute_severity(issues: &[Issue]) -> Severity {
        issues
            .iter()
            .map(|issue| issue.severity)
            .max()
            .unwrap_or(Severity::Info)
    }

    pub fn critical_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_critical()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn exit_code(&self) -> i32 {
        Self::compute_severity(&self.issues).exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_verdict_is_healthy() {
        let verdict = HealthVerdict::from_issues("dev", vec![], vec![]);
        assert!(verdict.healthy);
        assert!(verdict.can_proceed);
        assert_eq!(verdict.exit_code(), 0);
    }

    #[test]
    fn test_warning_does_not_block() {
        let verdict = HealthVerdict::from_issues(
            "dev",
            vec![Issue::warning(IssueSubject::Service, "api", "recovering")],
            vec![],
        );
        assert!(!verdict.healthy);
        assert!(verdict.can_proceed);
        assert_eq!(verdict.exit_code(), 2);
    }

    #[test]
    fn test_critical_blocks() {
        let verdict = HealthVerdict::from_issues(
            "dev",
            vec![
                Issue::warning(IssueSubject::Service, "worker", "degraded"),
                Issue::critical(IssueSubject::Service, "api", "service completely down"),
            ],
            vec![],
        );
        assert!(!verdict.can_proceed);
        assert_eq!(verdict.critical_count(), 1);
        assert_eq!(verdict.warning_count(), 1);
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn test_info_only_is_healthy() {
        let verdict = HealthVerdict::from_issues(
            "dev",
            vec![Issue::info(IssueSubject::Service, "api", "deployment in progress")],
            vec![],
        );
        assert!(verdict.healthy);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
