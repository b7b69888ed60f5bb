//! Anti-affinity group generations.
//!
//! A generation is one anti-affinity group in *every* configured region,
//! all sharing a single name so a batch can be correlated across regions.
//! Groups for all regions are created together, so failing over to
//! another region never waits on group creation.
//!
//! The manager owns the whole history. Only the last generation is
//! current; earlier ones are kept untouched for diagnostics. A new
//! generation starts only when every region of the current one has been
//! marked exhausted.

use tracing::{debug, info, warn};
use uuid::Uuid;

use hpclaunch_cloud::CloudApi;
use hpclaunch_core::PlacementConfig;

use crate::cleanup::{self, CleanupOutcome};
use crate::error::{PlacementError, PlacementResult};

/// A provider placement group. `id` is region-local; `name` is shared by
/// every group of the same generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementGroup {
    pub id: String,
    pub name: String,
    pub region: String,
}

/// One region's slot in a generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionGroup {
    pub group: PlacementGroup,
    pub exhausted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub name: String,
    /// In configured region order.
    pub groups: Vec<RegionGroup>,
}

impl Generation {
    pub fn get(&self, region: &str) -> Option<&RegionGroup> {
        self.groups.iter().find(|g| g.group.region == region)
    }

    fn get_mut(&mut self, region: &str) -> Option<&mut RegionGroup> {
        self.groups.iter_mut().find(|g| g.group.region == region)
    }

    pub fn all_exhausted(&self) -> bool {
        self.groups.iter().all(|g| g.exhausted)
    }
}

pub struct GroupManager {
    regions: Vec<String>,
    prefix: String,
    policy: String,
    history: Vec<Generation>,
}

impl GroupManager {
    pub fn new(regions: Vec<String>, placement: &PlacementConfig) -> Self {
        Self {
            regions,
            prefix: placement.group_prefix.clone(),
            policy: placement.group_policy.clone(),
            history: Vec::new(),
        }
    }

    /// Return the current generation's group for `region`, starting a new
    /// generation first if there is none or every region is exhausted.
    ///
    /// Within one generation repeated calls return the same group.
    pub async fn ensure_group(
        &mut self,
        cloud: &dyn CloudApi,
        region: &str,
    ) -> PlacementResult<RegionGroup> {
        if !self.regions.iter().any(|r| r == region) {
            return Err(PlacementError::UnknownRegion(region.to_string()));
        }

        if self.current().is_none_or(Generation::all_exhausted) {
            self.start_generation(cloud).await?;
        }

        self.current()
            .and_then(|g| g.get(region))
            .cloned()
            .ok_or_else(|| PlacementError::UnknownRegion(region.to_string()))
    }

    /// Flag `region` as exhausted in the current generation.
    ///
    /// Returns `false` when there is no current group for the region.
    pub fn mark_exhausted(&mut self, region: &str) -> bool {
        let Some(slot) = self.history.last_mut().and_then(|g| g.get_mut(region)) else {
            return false;
        };
        if !slot.exhausted {
            info!(region, group = %slot.group.name, "region exhausted for this generation");
        }
        slot.exhausted = true;
        true
    }

    pub fn is_exhausted(&self, region: &str) -> bool {
        self.current()
            .and_then(|g| g.get(region))
            .is_some_and(|slot| slot.exhausted)
    }

    pub fn current(&self) -> Option<&Generation> {
        self.history.last()
    }

    /// Every generation created so far, oldest first.
    pub fn history(&self) -> &[Generation] {
        &self.history
    }

    /// Create one group per region under a fresh shared name.
    ///
    /// All-or-nothing: if any region fails, the groups already created for
    /// this attempt are removed and nothing is recorded.
    async fn start_generation(&mut self, cloud: &dyn CloudApi) -> PlacementResult<()> {
        let name = format!("{}{}", self.prefix, Uuid::new_v4());
        let mut groups: Vec<RegionGroup> = Vec::with_capacity(self.regions.len());

        for region in &self.regions {
            self.sweep_stale(cloud, region).await;

            match cloud.create_server_group(region, &name, &self.policy).await {
                Ok(created) => {
                    debug!(%region, group = %name, id = %created.id, "placement group created");
                    groups.push(RegionGroup {
                        group: PlacementGroup {
                            id: created.id,
                            name: created.name,
                            region: region.clone(),
                        },
                        exhausted: false,
                    });
                }
                Err(source) => {
                    warn!(%region, group = %name, error = %source, "placement group creation failed");
                    for slot in &groups {
                        cleanup::remove_group(cloud, &slot.group).await;
                    }
                    return Err(PlacementError::GroupSetup {
                        region: region.clone(),
                        source,
                    });
                }
            }
        }

        info!(
            group = %name,
            regions = groups.len(),
            generation = self.history.len() + 1,
            "created {} group in all regions",
            self.policy
        );
        self.history.push(Generation { name, groups });
        Ok(())
    }

    /// Remove groups carrying the generation prefix from earlier runs or
    /// earlier generations. Failures are logged and ignored.
    async fn sweep_stale(&self, cloud: &dyn CloudApi, region: &str) {
        let existing = match cloud.list_server_groups(region).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(region, error = %e, "could not list placement groups; skipping cleanup");
                return;
            }
        };

        for stale in existing.into_iter().filter(|g| g.name.starts_with(&self.prefix)) {
            let group = PlacementGroup {
                id: stale.id,
                name: stale.name,
                region: region.to_string(),
            };
            if let CleanupOutcome::Removed = cleanup::remove_group(cloud, &group).await {
                debug!(region, group = %group.name, "removed stale placement group");
            }
        }
    }
}
