//! Name → identifier resolution for images, flavors and networks.
//!
//! Names are resolved independently in every region; a name that is
//! missing in one region only fails attempts in that region. Hits are
//! cached per `(region, kind, name)` for the life of the resolver.

use std::collections::HashMap;

use tracing::debug;

use hpclaunch_cloud::{CloudApi, NamedResource};
use hpclaunch_core::{PlacementRequest, ResourceKind};

use crate::error::{PlacementError, PlacementResult};

/// Provider ids needed to boot one instance in one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootTargets {
    pub image_id: String,
    pub flavor_id: String,
    pub network_id: String,
}

#[derive(Debug, Default)]
pub struct Resolver {
    cache: HashMap<(String, ResourceKind, String), String>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one named resource in `region` to its id.
    ///
    /// The first exact name match in the provider listing wins.
    pub async fn resolve(
        &mut self,
        cloud: &dyn CloudApi,
        region: &str,
        kind: ResourceKind,
        name: &str,
    ) -> PlacementResult<String> {
        let key = (region.to_string(), kind, name.to_string());
        if let Some(id) = self.cache.get(&key) {
            debug!(region, %kind, name, "resolved from cache");
            return Ok(id.clone());
        }

        let listing = match kind {
            ResourceKind::Image => cloud.list_images(region).await?,
            ResourceKind::Flavor => cloud.list_flavors(region).await?,
            ResourceKind::Network => cloud.list_networks(region).await?,
        };

        let id = first_match(&listing, name).ok_or_else(|| PlacementError::NotFound {
            kind,
            name: name.to_string(),
            region: region.to_string(),
        })?;

        debug!(region, %kind, name, %id, "resolved");
        self.cache.insert(key, id.clone());
        Ok(id)
    }

    /// Resolve the flavor, image and network a request boots with.
    pub async fn resolve_boot(
        &mut self,
        cloud: &dyn CloudApi,
        region: &str,
        request: &PlacementRequest,
    ) -> PlacementResult<BootTargets> {
        let flavor_id = self
            .resolve(cloud, region, ResourceKind::Flavor, &request.flavor)
            .await?;
        let image_id = self
            .resolve(cloud, region, ResourceKind::Image, &request.image)
            .await?;
        let network_id = self
            .resolve(cloud, region, ResourceKind::Network, &request.network)
            .await?;

        Ok(BootTargets {
            image_id,
            flavor_id,
            network_id,
        })
    }

    /// Number of cached lookups.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

fn first_match(listing: &[NamedResource], name: &str) -> Option<String> {
    listing.iter().find(|r| r.name == name).map(|r| r.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpclaunch_cloud::{MemoryCloud, RegionBehaviour};

    #[tokio::test]
    async fn first_exact_match_wins() {
        let cloud = MemoryCloud::new().with_region(
            "r1",
            RegionBehaviour::standard().with_images(vec![
                NamedResource::new("img-a", "ubuntu-16.04-x86_64-old"),
                NamedResource::new("img-b", "ubuntu-16.04-x86_64"),
                NamedResource::new("img-c", "ubuntu-16.04-x86_64"),
            ]),
        );
        let mut resolver = Resolver::new();

        let id = resolver
            .resolve(&cloud, "r1", ResourceKind::Image, "ubuntu-16.04-x86_64")
            .await
            .unwrap();
        assert_eq!(id, "img-b");
    }

    #[tokio::test]
    async fn missing_name_is_not_found_for_that_region() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard());
        let mut resolver = Resolver::new();

        let err = resolver
            .resolve(&cloud, "r1", ResourceKind::Flavor, "c9.huge")
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            PlacementError::NotFound { kind: ResourceKind::Flavor, name, region }
                if name == "c9.huge" && region == "r1"
        ));
        assert_eq!(err.to_string(), "flavor c9.huge not found in region r1");
        assert_eq!(resolver.cached(), 0);
    }

    #[tokio::test]
    async fn resolves_boot_targets_and_caches_per_region() {
        let cloud = MemoryCloud::new()
            .with_region("r1", RegionBehaviour::standard())
            .with_region("r2", RegionBehaviour::standard());
        let request = PlacementRequest {
            ordinal: 0,
            name: "instance-0".into(),
            image: "ubuntu-16.04-x86_64".into(),
            flavor: "c1.c1r1".into(),
            network: "private-net".into(),
            volume_size: 20,
            keypair: "ops".into(),
            assign_public_ip: false,
            cloud_init_path: None,
        };
        let mut resolver = Resolver::new();

        let targets = resolver.resolve_boot(&cloud, "r1", &request).await.unwrap();
        assert_eq!(
            targets,
            BootTargets {
                image_id: "img-ubuntu-1604".into(),
                flavor_id: "flv-c1c1r1".into(),
                network_id: "net-private".into(),
            }
        );
        assert_eq!(resolver.cached(), 3);

        resolver.resolve_boot(&cloud, "r1", &request).await.unwrap();
        assert_eq!(resolver.cached(), 3);

        resolver.resolve_boot(&cloud, "r2", &request).await.unwrap();
        assert_eq!(resolver.cached(), 6);
    }
}
