//! Stuck resource classification
//!
//! Reduces a stack's resource event history to the resources actually
//! blocking progress, ordered so that prerequisites are remediated before
//! the resources that depend on them.

use crate::config::EngineConfig;
use crate::models::{ResourceEvent, ResourceRef, StuckResource};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Age thresholds applied to resource events
#[derive(Debug, Clone, Copy)]
pub struct ClassifierThresholds {
    pub in_progress_mins: i64,
    pub fragile_mins: i64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ClassifierThresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            in_progress_mins: config.resource_in_progress_mins,
            fragile_mins: config.fragile_resource_mins,
        }
    }
}

/// Extract blocking resources from `events` as of `now`.
///
/// An event is retained when it is a failure, when it has been in progress
/// longer than the in-progress threshold, or when it belongs to an
/// autoscaling construct older than the shorter fragile threshold. Of the
/// retained events, the most recent per logical id is kept.
pub fn classify(
    events: &[ResourceEvent],
    now: DateTime<Utc>,
    thresholds: ClassifierThresholds,
) -> Vec<StuckResource> {
    let mut latest: HashMap<&str, (&ResourceEvent, String)> = HashMap::new();
    for event in events {
        let Some(reason) = retention_reason(event, now, thresholds) else {
            continue;
        };
        let newer = latest
            .get(event.logical_id.as_str())
            .map_or(true, |(current, _)| event.timestamp > current.timestamp);
        if newer {
            latest.insert(event.logical_id.as_str(), (event, reason));
        }
    }

    let mut stuck: Vec<StuckResource> = latest
        .into_values()
        .map(|(event, reason)| {
            let kind = event.kind();
            StuckResource {
                resource: ResourceRef {
                    logical_id: event.logical_id.clone(),
                    resource_type: event.resource_type.clone(),
                    physical_id: event.physical_id.clone(),
                },
                status: event.status.clone(),
                classification_reason: reason,
                priority_rank: kind.priority(),
                last_event_time: event.timestamp,
            }
        })
        .collect();

    stuck.sort_by(|a, b| {
        let a_fragile = a.resource.kind().is_fragile();
        let b_fragile = b.resource.kind().is_fragile();
        b_fragile
            .cmp(&a_fragile)
            .then(a.priority_rank.cmp(&b.priority_rank))
            .then(a.resource.logical_id.cmp(&b.resource.logical_id))
    });

    stuck
}

fn retention_reason(
    event: &ResourceEvent,
    now: DateTime<Utc>,
    thresholds: ClassifierThresholds,
) -> Option<String> {
    let age = (now - event.timestamp).num_minutes();

    if event.is_failed() {
        let detail = event.reason.as_deref().unwrap_or("no reason reported");
        return Some(format!("{}: {}", event.status, detail));
    }

    if event.is_in_progress() && age > thresholds.in_progress_mins {
        return Some(format!("{} for {} minutes", event.status, age));
    }

    if event.kind().is_fragile() && age > thresholds.fragile_mins {
        return Some(format!(
            "autoscaling resource {} for {} minutes",
            event.status, age
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::event;

    const POLICY: &str = "AWS::ApplicationAutoScaling::ScalingPolicy";
    const TARGET: &str = "AWS::ApplicationAutoScaling::ScalableTarget";
    const SERVICE: &str = "AWS::ECS::Service";
    const TARGET_GROUP: &str = "AWS::ElasticLoadBalancingV2::TargetGroup";
    const TASK_DEF: &str = "AWS::ECS::TaskDefinition";

    fn ids(stuck: &[StuckResource]) -> Vec<&str> {
        stuck.iter().map(|s| s.resource.logical_id.as_str()).collect()
    }

    #[test]
    fn test_failed_events_always_retained() {
        let events = vec![event("Bucket", "AWS::S3::Bucket", "UPDATE_FAILED", 0)];
        let stuck = classify(&events, Utc::now(), ClassifierThresholds::default());
        assert_eq!(ids(&stuck), vec!["Bucket"]);
        assert_eq!(stuck[0].priority_rank, 10);
    }

    #[test]
    fn test_young_in_progress_not_retained() {
        let events = vec![
            event("ApiService", SERVICE, "UPDATE_IN_PROGRESS", 9),
            event("ApiTargetGroup", TARGET_GROUP, "UPDATE_IN_PROGRESS", 2),
        ];
        let stuck = classify(&events, Utc::now(), ClassifierThresholds::default());
        assert!(stuck.is_empty());
    }

    #[test]
    fn test_fragile_resources_use_shorter_threshold() {
        let events = vec![
            event("ApiScalingPolicy", POLICY, "CREATE_IN_PROGRESS", 6),
            event("ApiService", SERVICE, "CREATE_IN_PROGRESS", 6),
        ];
        let stuck = classify(&events, Utc::now(), ClassifierThresholds::default());
        assert_eq!(ids(&stuck), vec!["ApiScalingPolicy"]);
    }

    #[test]
    fn test_latest_retained_event_wins() {
        let events = vec![
            event("ApiService", SERVICE, "UPDATE_COMPLETE", 1),
            event("ApiService", SERVICE, "UPDATE_FAILED", 20),
            event("Worker", SERVICE, "UPDATE_IN_PROGRESS", 40),
            event("Worker", SERVICE, "UPDATE_FAILED", 15),
        ];
        let stuck = classify(&events, Utc::now(), ClassifierThresholds::default());
        assert_eq!(ids(&stuck), vec!["ApiService", "Worker"]);
        assert_eq!(stuck[0].status, "UPDATE_FAILED");
        assert_eq!(stuck[1].status, "UPDATE_FAILED");
    }

    #[test]
    fn test_failure_survives_later_completion() {
        let events = vec![
            event("ApiService", SERVICE, "UPDATE_COMPLETE", 1),
            event("ApiService", SERVICE, "UPDATE_FAILED", 20),
        ];
        let stuck = classify(&events, Utc::now(), ClassifierThresholds::default());
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].status, "UPDATE_FAILED");
    }

    #[test]
    fn test_fragile_resources_retained_regardless_of_status() {
        let events = vec![
            event("ApiScalableTarget", TARGET, "CREATE_COMPLETE", 6),
            event("ApiScalingPolicy", POLICY, "CREATE_COMPLETE", 3),
            event("ApiService", SERVICE, "CREATE_COMPLETE", 6),
        ];
        let stuck = classify(&events, Utc::now(), ClassifierThresholds::default());
        assert_eq!(ids(&stuck), vec!["ApiScalableTarget"]);
        assert!(stuck[0].classification_reason.starts_with("autoscaling resource"));
    }

    #[test]
    fn test_priority_ordering() {
        let events = vec![
            event("Bucket", "AWS::S3::Bucket", "UPDATE_FAILED", 20),
            event("ApiTaskDef", TASK_DEF, "UPDATE_FAILED", 20),
            event("ApiTargetGroup", TARGET_GROUP, "UPDATE_FAILED", 20),
            event("ApiService", SERVICE, "UPDATE_FAILED", 20),
            event("ApiScalableTarget", TARGET, "UPDATE_FAILED", 20),
            event("ApiScalingPolicy", POLICY, "UPDATE_FAILED", 20),
        ];
        let stuck = classify(&events, Utc::now(), ClassifierThresholds::default());
        assert_eq!(
            ids(&stuck),
            vec![
                "ApiScalingPolicy",
                "ApiScalableTarget",
                "ApiService",
                "ApiTargetGroup",
                "ApiTaskDef",
                "Bucket"
            ]
        );
        let ranks: Vec<u8> = stuck.iter().map(|s| s.priority_rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5, 10]);
    }

    #[test]
    fn test_at_most_one_entry_per_logical_id() {
        let events = vec![
            event("ApiService", SERVICE, "UPDATE_FAILED", 30),
            event("ApiService", SERVICE, "UPDATE_IN_PROGRESS", 25),
        ];
        let stuck = classify(&events, Utc::now(), ClassifierThresholds::default());
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].status, "UPDATE_IN_PROGRESS");
    }

    #[test]
    fn test_empty_history() {
        assert!(classify(&[], Utc::now(), ClassifierThresholds::default()).is_empty());
    }
}
