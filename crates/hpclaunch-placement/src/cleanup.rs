//! Best-effort deletes.
//!
//! Cleanup never fails the caller: the result is logged and returned as
//! a [`CleanupOutcome`] for callers that want to inspect it.

use tracing::{debug, warn};

use hpclaunch_cloud::{CloudApi, FloatingIp};

use crate::groups::PlacementGroup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed,
    /// The provider no longer knows the resource.
    AlreadyGone,
    Failed(String),
}

impl CleanupOutcome {
    pub fn is_removed(&self) -> bool {
        matches!(self, CleanupOutcome::Removed | CleanupOutcome::AlreadyGone)
    }
}

/// Delete an instance left behind by a failed placement.
pub async fn remove_instance(cloud: &dyn CloudApi, region: &str, server_id: &str) -> CleanupOutcome {
    let outcome = match cloud.delete_server(region, server_id).await {
        Ok(()) => CleanupOutcome::Removed,
        Err(e) if e.is_not_found() => CleanupOutcome::AlreadyGone,
        Err(e) => CleanupOutcome::Failed(e.to_string()),
    };
    match &outcome {
        CleanupOutcome::Failed(reason) => {
            warn!(region, server = server_id, %reason, "could not delete instance")
        }
        _ => debug!(region, server = server_id, "instance deleted"),
    }
    outcome
}

/// Release a floating address that never made it onto an instance.
pub async fn remove_floating_ip(cloud: &dyn CloudApi, region: &str, ip: &FloatingIp) -> CleanupOutcome {
    let outcome = match cloud.delete_floating_ip(region, &ip.id).await {
        Ok(()) => CleanupOutcome::Removed,
        Err(e) if e.is_not_found() => CleanupOutcome::AlreadyGone,
        Err(e) => CleanupOutcome::Failed(e.to_string()),
    };
    match &outcome {
        CleanupOutcome::Failed(reason) => {
            warn!(region, address = %ip.address, %reason, "could not release floating address")
        }
        _ => debug!(region, address = %ip.address, "floating address released"),
    }
    outcome
}

/// Delete a placement group.
pub async fn remove_group(cloud: &dyn CloudApi, group: &PlacementGroup) -> CleanupOutcome {
    let outcome = match cloud.delete_server_group(&group.region, &group.id).await {
        Ok(()) => CleanupOutcome::Removed,
        Err(e) if e.is_not_found() => CleanupOutcome::AlreadyGone,
        Err(e) => CleanupOutcome::Failed(e.to_string()),
    };
    match &outcome {
        CleanupOutcome::Failed(reason) => warn!(
            region = %group.region,
            group = %group.name,
            id = %group.id,
            %reason,
            "could not delete placement group"
        ),
        _ => debug!(region = %group.region, group = %group.name, "placement group deleted"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpclaunch_cloud::{MemoryCloud, RegionBehaviour};

    #[tokio::test]
    async fn missing_instance_counts_as_gone() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard());
        let outcome = remove_instance(&cloud, "r1", "srv-404").await;
        assert_eq!(outcome, CleanupOutcome::AlreadyGone);
        assert!(outcome.is_removed());
    }

    #[tokio::test]
    async fn refused_group_delete_is_reported_not_raised() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard().with_failing_group_delete());
        let seeded = cloud.seed_server_group("r1", "AF-stale");
        let group = PlacementGroup {
            id: seeded.id,
            name: seeded.name,
            region: "r1".into(),
        };

        let outcome = remove_group(&cloud, &group).await;
        assert!(matches!(outcome, CleanupOutcome::Failed(ref reason) if reason.contains("403")));
        assert_eq!(cloud.live_groups("r1").len(), 1);
    }
}
