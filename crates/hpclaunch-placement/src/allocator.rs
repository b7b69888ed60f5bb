//! The placement loop.
//!
//! Ordinals are placed one at a time. For each ordinal the regions are
//! tried in configured order until one yields an active instance:
//!
//! ```text
//! Pending ─► Attempting(r1) ─┬─► Placed
//!                            ├─► Retrying(r2) ─► Attempting(r2) ─► …
//!                            └─► Failed        (no region left)
//! ```
//!
//! Every error raised while trying a region is turned into an outcome for
//! that region; nothing escapes [`Allocator::run`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use hpclaunch_cloud::{CloudApi, Server};
use hpclaunch_core::{Instance, LaunchConfig, PlacementOutcome, PlacementRequest, RegionConfig};

use crate::classifier::{FaultClassifier, MarkerClassifier};
use crate::error::PlacementResult;
use crate::groups::GroupManager;
use crate::poll::PollPolicy;
use crate::provisioner::Provisioner;
use crate::status::check_active;

/// Where one ordinal is in the placement loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrdinalState {
    Pending,
    Attempting(String),
    /// The last region failed; the named region is next.
    Retrying(String),
    Placed,
    Failed,
}

/// Everything that happened to one ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinalRecord {
    pub ordinal: u32,
    pub name: String,
    pub state: OrdinalState,
    /// One entry per region visited, in visiting order.
    pub outcomes: Vec<PlacementOutcome>,
}

impl OrdinalRecord {
    fn new(request: &PlacementRequest) -> Self {
        Self {
            ordinal: request.ordinal,
            name: request.name.clone(),
            state: OrdinalState::Pending,
            outcomes: Vec::new(),
        }
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.outcomes.iter().find_map(|o| match o {
            PlacementOutcome::Placed(instance) => Some(instance),
            _ => None,
        })
    }

    /// Regions where a provider call was actually made.
    pub fn attempts(&self) -> usize {
        self.outcomes.iter().filter(|o| o.was_attempted()).count()
    }
}

/// Result of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationReport {
    /// Placed instances in ordinal order. Failed ordinals leave a gap.
    pub instances: Vec<Instance>,
    pub ordinals: Vec<OrdinalRecord>,
}

impl AllocationReport {
    pub fn failed_ordinals(&self) -> Vec<u32> {
        self.ordinals
            .iter()
            .filter(|r| r.state == OrdinalState::Failed)
            .map(|r| r.ordinal)
            .collect()
    }
}

pub struct Allocator<'c> {
    cloud: &'c dyn CloudApi,
    regions: Arc<[RegionConfig]>,
    groups: GroupManager,
    provisioner: Provisioner<'c>,
    classifier: Box<dyn FaultClassifier>,
    active_policy: PollPolicy,
}

impl<'c> Allocator<'c> {
    pub fn new(cloud: &'c dyn CloudApi, config: &LaunchConfig) -> Self {
        Self {
            cloud,
            regions: config.regions.iter().cloned().collect(),
            groups: GroupManager::new(config.region_names(), &config.placement),
            provisioner: Provisioner::new(cloud, PollPolicy::address_attached(&config.polling)),
            classifier: Box::new(MarkerClassifier::new(
                config.placement.capacity_fault_marker.clone(),
            )),
            active_policy: PollPolicy::instance_active(&config.polling),
        }
    }

    /// Replace the capacity classifier.
    pub fn with_classifier(mut self, classifier: impl FaultClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Generation history accumulated so far.
    pub fn groups(&self) -> &GroupManager {
        &self.groups
    }

    /// Place every request, in order. Never fails: ordinals that could not
    /// be placed anywhere are reported as [`OrdinalState::Failed`].
    pub async fn run(&mut self, requests: &[PlacementRequest]) -> AllocationReport {
        let mut report = AllocationReport::default();

        for request in requests {
            let record = self.place(request).await;
            if let Some(instance) = record.instance() {
                report.instances.push(instance.clone());
            } else {
                warn!(
                    ordinal = record.ordinal,
                    name = %record.name,
                    regions = record.outcomes.len(),
                    "could not place instance in any region"
                );
            }
            report.ordinals.push(record);
        }

        info!(
            requested = requests.len(),
            placed = report.instances.len(),
            generations = self.groups.history().len(),
            "placement run complete"
        );
        report
    }

    async fn place(&mut self, request: &PlacementRequest) -> OrdinalRecord {
        let mut record = OrdinalRecord::new(request);
        let regions = Arc::clone(&self.regions);

        for (idx, region) in regions.iter().enumerate() {
            record.state = OrdinalState::Attempting(region.name.clone());
            let outcome = self.attempt(region, request).await;
            let placed = outcome.is_placed();
            record.outcomes.push(outcome);

            if placed {
                record.state = OrdinalState::Placed;
                return record;
            }
            record.state = match regions.get(idx + 1) {
                Some(next) => OrdinalState::Retrying(next.name.clone()),
                None => OrdinalState::Failed,
            };
        }

        record.state = OrdinalState::Failed;
        record
    }

    async fn attempt(&mut self, region: &RegionConfig, request: &PlacementRequest) -> PlacementOutcome {
        let name = region.name.as_str();

        let slot = match self.groups.ensure_group(self.cloud, name).await {
            Ok(slot) => slot,
            Err(e) => return transient(name, request, e.to_string()),
        };
        if slot.exhausted {
            debug!(region = name, ordinal = request.ordinal, "region exhausted; skipping");
            return PlacementOutcome::Skipped {
                region: name.to_string(),
            };
        }

        let server = match self.provisioner.create(name, &slot.group, request).await {
            Ok(server) => server,
            Err(e) => return transient(name, request, e.to_string()),
        };

        let status = match check_active(self.cloud, name, &server.id, self.active_policy).await {
            Ok(status) => status,
            Err(e) => return transient(name, request, e.to_string()),
        };

        if status.active {
            let instance = match self.finish(region, request, server).await {
                Ok(instance) => instance,
                Err(e) => return transient(name, request, e.to_string()),
            };
            info!(
                region = name,
                ordinal = request.ordinal,
                id = %instance.id,
                name = %instance.name,
                "instance placed"
            );
            return PlacementOutcome::Placed(instance);
        }

        if self.classifier.is_capacity_exhausted(&status.reason) {
            warn!(
                region = name,
                ordinal = request.ordinal,
                reason = %status.reason,
                "capacity fault; marking region exhausted"
            );
            self.groups.mark_exhausted(name);
            self.provisioner.cleanup_instance(name, &server.id).await;
            return PlacementOutcome::RegionExhausted {
                region: name.to_string(),
                reason: status.reason,
            };
        }

        transient(name, request, status.reason)
    }

    /// Attach a public address if requested and read back final networks.
    ///
    /// A requested address that cannot be allocated or attached fails the
    /// attempt; the instance is deleted so the ordinal can move on.
    async fn finish(
        &self,
        region: &RegionConfig,
        request: &PlacementRequest,
        server: Server,
    ) -> PlacementResult<Instance> {
        if request.assign_public_ip {
            if let Err(e) = self.provisioner.assign_public_address(region, &server.id).await {
                warn!(region = %region.name, server = %server.id, error = %e, "public address assignment failed");
                self.provisioner.cleanup_instance(&region.name, &server.id).await;
                return Err(e);
            }
        }

        match self.provisioner.refresh(&region.name, &server.id).await {
            Ok(fresh) => Ok(fresh.to_instance(&region.name)),
            Err(e) => {
                warn!(region = %region.name, server = %server.id, error = %e, "final refresh failed; reporting create-time view");
                Ok(server.to_instance(&region.name))
            }
        }
    }
}

fn transient(region: &str, request: &PlacementRequest, reason: String) -> PlacementOutcome {
    warn!(region, ordinal = request.ordinal, %reason, "placement attempt failed");
    PlacementOutcome::TransientFailure {
        region: region.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpclaunch_cloud::{MemoryCloud, RegionBehaviour};
    use hpclaunch_core::LaunchSpec;

    fn config(regions: &[&str]) -> LaunchConfig {
        LaunchConfig {
            regions: regions
                .iter()
                .map(|r| RegionConfig::new(*r, format!("pub-{r}")))
                .collect(),
            ..LaunchConfig::default()
        }
    }

    fn requests(count: u32) -> Vec<PlacementRequest> {
        LaunchSpec {
            count,
            name_prefix: "instance-".into(),
            image: "ubuntu-16.04-x86_64".into(),
            flavor: "c1.c1r1".into(),
            network: "private-net".into(),
            volume_size: 20,
            keypair: "ops".into(),
            assign_public_ip: false,
            cloud_init_path: None,
        }
        .requests()
    }

    #[tokio::test(start_paused = true)]
    async fn state_ends_placed_on_first_region() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard());
        let mut allocator = Allocator::new(&cloud, &config(&["r1"]));

        let report = allocator.run(&requests(1)).await;

        assert_eq!(report.ordinals[0].state, OrdinalState::Placed);
        assert_eq!(report.ordinals[0].attempts(), 1);
        assert!(report.failed_ordinals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn state_ends_failed_when_every_region_fails() {
        let cloud = MemoryCloud::new()
            .with_region("r1", RegionBehaviour::standard().with_create_error("boom"))
            .with_region("r2", RegionBehaviour::standard().with_create_error("boom"));
        let mut allocator = Allocator::new(&cloud, &config(&["r1", "r2"]));

        let report = allocator.run(&requests(1)).await;

        assert_eq!(report.ordinals[0].state, OrdinalState::Failed);
        assert_eq!(report.failed_ordinals(), [0]);
        assert!(report.instances.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn injected_classifier_decides_exhaustion() {
        let cloud = MemoryCloud::new()
            .with_region("r1", RegionBehaviour::standard().with_build_fault("quota exceeded"))
            .with_region("r2", RegionBehaviour::standard());
        let mut allocator = Allocator::new(&cloud, &config(&["r1", "r2"]))
            .with_classifier(|reason: &str| reason.contains("quota"));

        let report = allocator.run(&requests(2)).await;

        assert_eq!(report.instances.len(), 2);
        assert!(allocator.groups().is_exhausted("r1"));
        assert!(matches!(
            report.ordinals[0].outcomes[0],
            PlacementOutcome::RegionExhausted { .. }
        ));
        assert_eq!(
            report.ordinals[1].outcomes[0],
            PlacementOutcome::Skipped { region: "r1".into() }
        );
    }

    #[tokio::test]
    async fn empty_region_list_fails_every_ordinal() {
        let cloud = MemoryCloud::new();
        let mut config = LaunchConfig::default();
        config.regions.clear();
        let mut allocator = Allocator::new(&cloud, &config);

        let report = allocator.run(&requests(2)).await;

        assert_eq!(report.failed_ordinals(), [0, 1]);
        assert!(cloud.calls().groups_created.is_empty());
    }
}
