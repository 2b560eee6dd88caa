//! Conflict recovery for scalable target registration
//!
//! When registering a scalable target is rejected as conflicting, the
//! existing registration is removed and recreated. The cycle is an explicit
//! state machine with its own attempt budget:
//!
//! ```text
//! Conflict -> Deleting -> Recreating -> Resolved
//!    ^                        |
//!    +------- conflict -------+        (budget exhausted -> error)
//! ```

use crate::backend::ScalingApi;
use crate::error::{BackendError, BackendResult, ErrorKind};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConflictState {
    Conflict,
    Deleting,
    Recreating,
    Resolved,
}

/// Registers a scalable target, recovering from conflicts
pub struct ConflictResolver<'a> {
    scaling: &'a dyn ScalingApi,
    budget: u32,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(scaling: &'a dyn ScalingApi, budget: u32) -> Self {
        Self { scaling, budget }
    }

    pub async fn register(
        &self,
        resource_id: &str,
        min_capacity: u32,
        max_capacity: u32,
    ) -> BackendResult<()> {
        let mut state = match self
            .scaling
            .register_scalable_target(resource_id, min_capacity, max_capacity)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) if e.is_conflict() => ConflictState::Conflict,
            Err(e) => return Err(e),
        };

        let mut attempts = 0u32;
        loop {
            debug!(resource_id = %resource_id, ?state, attempts, "Conflict recovery step");
            state = match state {
                ConflictState::Conflict => {
                    if attempts >= self.budget {
                        warn!(resource_id = %resource_id, attempts, "Conflict recovery budget exhausted");
                        return Err(BackendError::new(
                            ErrorKind::Conflict,
                            "register_scalable_target",
                            format!("conflict persisted after {attempts} recovery attempts"),
                        ));
                    }
                    attempts += 1;
                    ConflictState::Deleting
                }
                ConflictState::Deleting => {
                    match self.scaling.deregister_scalable_target(resource_id).await {
                        Ok(()) => ConflictState::Recreating,
                        Err(e) if e.is_not_found() => ConflictState::Recreating,
                        Err(e) => return Err(e),
                    }
                }
                ConflictState::Recreating => {
                    match self
                        .scaling
                        .register_scalable_target(resource_id, min_capacity, max_capacity)
                        .await
                    {
                        Ok(()) => ConflictState::Resolved,
                        Err(e) if e.is_conflict() => ConflictState::Conflict,
                        Err(e) => return Err(e),
                    }
                }
                ConflictState::Resolved => return Ok(()),
            };
        }
    }
}
