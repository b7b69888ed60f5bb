//! Domain types for multi-region placement.
//!
//! A batch is a flat list of identical [`PlacementRequest`]s. Each request
//! ends up with a trail of [`PlacementOutcome`]s (one per region tried) and,
//! when it succeeds, exactly one placed [`Instance`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Provider region identifier (e.g. `nz-hlz-1`).
pub type RegionName = String;

/// Provider-assigned instance identifier.
pub type InstanceId = String;

// ── Regions ───────────────────────────────────────────────────────

/// A region the allocator may place instances in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionConfig {
    pub name: RegionName,
    /// External network floating addresses are allocated from.
    pub public_network_id: String,
}

impl RegionConfig {
    pub fn new(name: impl Into<String>, public_network_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public_network_id: public_network_id.into(),
        }
    }
}

// ── Requests ──────────────────────────────────────────────────────

/// Kind of named resource the resolver looks up per region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    Flavor,
    Network,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Image => "image",
            ResourceKind::Flavor => "flavor",
            ResourceKind::Network => "network",
        };
        f.write_str(label)
    }
}

/// The batch as the operator asked for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaunchSpec {
    /// How many instances to create.
    pub count: u32,
    /// Instance names are `{name_prefix}{ordinal}`.
    pub name_prefix: String,
    pub image: String,
    pub flavor: String,
    pub network: String,
    /// Root volume size in GB.
    pub volume_size: u32,
    pub keypair: String,
    pub assign_public_ip: bool,
    pub cloud_init_path: Option<PathBuf>,
}

impl LaunchSpec {
    /// Expand the batch into one request per ordinal.
    pub fn requests(&self) -> Vec<PlacementRequest> {
        (0..self.count)
            .map(|ordinal| PlacementRequest {
                ordinal,
                name: format!("{}{}", self.name_prefix, ordinal),
                image: self.image.clone(),
                flavor: self.flavor.clone(),
                network: self.network.clone(),
                volume_size: self.volume_size,
                keypair: self.keypair.clone(),
                assign_public_ip: self.assign_public_ip,
                cloud_init_path: self.cloud_init_path.clone(),
            })
            .collect()
    }
}

/// One instance to place. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementRequest {
    pub ordinal: u32,
    pub name: String,
    pub image: String,
    pub flavor: String,
    pub network: String,
    pub volume_size: u32,
    pub keypair: String,
    pub assign_public_ip: bool,
    pub cloud_init_path: Option<PathBuf>,
}

// ── Results ───────────────────────────────────────────────────────

/// Addresses an instance holds on one network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkAddresses {
    pub network: String,
    pub addresses: Vec<String>,
}

/// An instance the provider reported active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instance {
    pub region: RegionName,
    pub id: InstanceId,
    pub name: String,
    pub networks: Vec<NetworkAddresses>,
}

impl Instance {
    /// Whether `address` appears on any of the instance's networks.
    pub fn has_address(&self, address: &str) -> bool {
        self.networks
            .iter()
            .any(|n| n.addresses.iter().any(|a| a == address))
    }

    /// Render networks as `net=a, b; other=c`.
    pub fn networks_display(&self) -> String {
        self.networks
            .iter()
            .map(|n| format!("{}={}", n.network, n.addresses.join(", ")))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Result of trying one region for one ordinal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlacementOutcome {
    /// The instance is active in this region.
    Placed(Instance),
    /// The region reported a capacity fault and is exhausted for the
    /// rest of the generation.
    RegionExhausted { region: RegionName, reason: String },
    /// The attempt failed for a reason that does not exhaust the region.
    TransientFailure { region: RegionName, reason: String },
    /// The region was already exhausted; no provider call was made.
    Skipped { region: RegionName },
}

impl PlacementOutcome {
    pub fn region(&self) -> &str {
        match self {
            PlacementOutcome::Placed(instance) => &instance.region,
            PlacementOutcome::RegionExhausted { region, .. }
            | PlacementOutcome::TransientFailure { region, .. }
            | PlacementOutcome::Skipped { region } => region,
        }
    }

    pub fn is_placed(&self) -> bool {
        matches!(self, PlacementOutcome::Placed(_))
    }

    /// Whether a provider call was made for this outcome.
    pub fn was_attempted(&self) -> bool {
        !matches!(self, PlacementOutcome::Skipped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(count: u32) -> LaunchSpec {
        LaunchSpec {
            count,
            name_prefix: "instance-".to_string(),
            image: "ubuntu-16.04-x86_64".to_string(),
            flavor: "c1.c1r1".to_string(),
            network: "private-net".to_string(),
            volume_size: 20,
            keypair: "ops".to_string(),
            assign_public_ip: false,
            cloud_init_path: None,
        }
    }

    #[test]
    fn requests_are_named_by_ordinal() {
        let requests = spec(3).requests();
        let names: Vec<_> = requests.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["instance-0", "instance-1", "instance-2"]);
        assert_eq!(requests[2].ordinal, 2);
    }

    #[test]
    fn zero_count_yields_no_requests() {
        assert!(spec(0).requests().is_empty());
    }

    #[test]
    fn networks_display_joins_addresses() {
        let instance = Instance {
            region: "nz-por-1".to_string(),
            id: "abc".to_string(),
            name: "instance-0".to_string(),
            networks: vec![
                NetworkAddresses {
                    network: "private-net".to_string(),
                    addresses: vec!["10.0.0.5".to_string(), "203.0.113.9".to_string()],
                },
                NetworkAddresses {
                    network: "storage".to_string(),
                    addresses: vec!["10.1.0.5".to_string()],
                },
            ],
        };

        assert_eq!(
            instance.networks_display(),
            "private-net=10.0.0.5, 203.0.113.9; storage=10.1.0.5"
        );
        assert!(instance.has_address("203.0.113.9"));
        assert!(!instance.has_address("203.0.113.10"));
    }

    #[test]
    fn outcome_reports_region() {
        let outcome = PlacementOutcome::RegionExhausted {
            region: "nz-hlz-1".to_string(),
            reason: "No valid host was found".to_string(),
        };
        assert_eq!(outcome.region(), "nz-hlz-1");
        assert!(!outcome.is_placed());
        assert!(outcome.was_attempted());
        assert!(!PlacementOutcome::Skipped { region: "r".to_string() }.was_attempted());
    }
}
