//! Instance creation and public address assignment.
//!
//! The provisioner only supplies the placement group as a scheduler hint;
//! anti-affinity itself is enforced by the provider.

use tracing::{debug, info, warn};

use hpclaunch_cloud::{BootVolume, CloudApi, FloatingIp, Server, ServerCreate};
use hpclaunch_core::{PlacementRequest, RegionConfig};

use crate::cleanup::{self, CleanupOutcome};
use crate::error::{PlacementError, PlacementResult};
use crate::groups::PlacementGroup;
use crate::poll::{PollPolicy, poll_until};
use crate::resolver::Resolver;

/// A floating address attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressAssignment {
    pub floating_ip: FloatingIp,
    /// Whether the address showed up on the instance within the budget.
    pub visible: bool,
}

pub struct Provisioner<'c> {
    cloud: &'c dyn CloudApi,
    resolver: Resolver,
    address_policy: PollPolicy,
}

impl<'c> Provisioner<'c> {
    pub fn new(cloud: &'c dyn CloudApi, address_policy: PollPolicy) -> Self {
        Self {
            cloud,
            resolver: Resolver::new(),
            address_policy,
        }
    }

    /// Issue a boot-from-volume create for `request` in `region`, hinted
    /// into `group`. Returns as soon as the provider accepts the request.
    pub async fn create(
        &mut self,
        region: &str,
        group: &PlacementGroup,
        request: &PlacementRequest,
    ) -> PlacementResult<Server> {
        let targets = self.resolver.resolve_boot(self.cloud, region, request).await?;

        let user_data = match &request.cloud_init_path {
            Some(path) => Some(tokio::fs::read(path).await.map_err(|source| {
                PlacementError::UserData {
                    path: path.display().to_string(),
                    source,
                }
            })?),
            None => None,
        };

        let create = ServerCreate {
            name: request.name.clone(),
            image_id: targets.image_id.clone(),
            flavor_id: targets.flavor_id,
            network_id: targets.network_id,
            key_name: request.keypair.clone(),
            boot_volume: BootVolume {
                image_id: targets.image_id,
                size_gb: request.volume_size,
                delete_on_termination: true,
            },
            group_id: group.id.clone(),
            user_data,
        };

        let server = self.cloud.create_server(region, &create).await?;
        debug!(
            region,
            server = %server.id,
            name = %server.name,
            group = %group.name,
            "create accepted"
        );
        Ok(server)
    }

    /// Allocate a floating address on the region's public network, attach
    /// it, and wait for it to appear on the instance.
    pub async fn assign_public_address(
        &self,
        region: &RegionConfig,
        server_id: &str,
    ) -> PlacementResult<AddressAssignment> {
        let floating_ip = self
            .cloud
            .create_floating_ip(&region.name, &region.public_network_id)
            .await?;
        if let Err(e) = self
            .cloud
            .add_floating_ip(&region.name, server_id, &floating_ip.address)
            .await
        {
            cleanup::remove_floating_ip(self.cloud, &region.name, &floating_ip).await;
            return Err(e.into());
        }

        let cloud = self.cloud;
        let name = region.name.as_str();
        let address = floating_ip.address.as_str();
        let visible = poll_until(self.address_policy, || async move {
            let server = cloud.get_server(name, server_id).await?;
            Ok::<_, PlacementError>(server.has_address(address))
        })
        .await?;

        if visible {
            info!(region = %region.name, server = server_id, %address, "public address attached");
        } else {
            warn!(
                region = %region.name,
                server = server_id,
                %address,
                "public address not visible on instance within budget"
            );
        }

        Ok(AddressAssignment {
            floating_ip,
            visible,
        })
    }

    /// Current provider view of an instance.
    pub async fn refresh(&self, region: &str, server_id: &str) -> PlacementResult<Server> {
        Ok(self.cloud.get_server(region, server_id).await?)
    }

    /// Delete an instance whose placement failed. Never fails.
    pub async fn cleanup_instance(&self, region: &str, server_id: &str) -> CleanupOutcome {
        cleanup::remove_instance(self.cloud, region, server_id).await
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    use hpclaunch_cloud::{MemoryCloud, RegionBehaviour};

    fn request() -> PlacementRequest {
        PlacementRequest {
            ordinal: 0,
            name: "instance-0".into(),
            image: "ubuntu-16.04-x86_64".into(),
            flavor: "c1.c1r1".into(),
            network: "private-net".into(),
            volume_size: 40,
            keypair: "ops".into(),
            assign_public_ip: false,
            cloud_init_path: None,
        }
    }

    fn address_policy() -> PollPolicy {
        PollPolicy::new(Duration::from_secs(30), Duration::from_secs(2))
    }

    async fn group(cloud: &MemoryCloud) -> PlacementGroup {
        let g = cloud
            .create_server_group("r1", "AF-test", "anti-affinity")
            .await
            .unwrap();
        PlacementGroup {
            id: g.id,
            name: g.name,
            region: "r1".into(),
        }
    }

    #[tokio::test]
    async fn create_boots_from_volume_with_group_hint() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard());
        let group = group(&cloud).await;
        let mut provisioner = Provisioner::new(&cloud, address_policy());

        let server = provisioner.create("r1", &group, &request()).await.unwrap();
        assert_eq!(server.name, "instance-0");

        let calls = cloud.calls();
        let (region, sent) = &calls.servers_created[0];
        assert_eq!(region, "r1");
        assert_eq!(sent.group_id, group.id);
        assert_eq!(sent.image_id, "img-ubuntu-1604");
        assert_eq!(sent.flavor_id, "flv-c1c1r1");
        assert_eq!(sent.network_id, "net-private");
        assert_eq!(sent.key_name, "ops");
        assert_eq!(
            sent.boot_volume,
            BootVolume {
                image_id: "img-ubuntu-1604".into(),
                size_gb: 40,
                delete_on_termination: true,
            }
        );
        assert!(sent.user_data.is_none());
    }

    #[tokio::test]
    async fn cloud_init_script_becomes_user_data() {
        let mut script = tempfile::NamedTempFile::new().unwrap();
        write!(script, "#cloud-config\npackages: [htop]\n").unwrap();

        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard());
        let group = group(&cloud).await;
        let mut provisioner = Provisioner::new(&cloud, address_policy());
        let mut req = request();
        req.cloud_init_path = Some(script.path().to_path_buf());

        provisioner.create("r1", &group, &req).await.unwrap();

        let calls = cloud.calls();
        assert_eq!(
            calls.servers_created[0].1.user_data.as_deref(),
            Some(&b"#cloud-config\npackages: [htop]\n"[..])
        );
    }

    #[tokio::test]
    async fn unreadable_script_fails_the_attempt_before_create() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard());
        let group = group(&cloud).await;
        let mut provisioner = Provisioner::new(&cloud, address_policy());
        let mut req = request();
        req.cloud_init_path = Some("/nonexistent/cloud-init.yaml".into());

        let err = provisioner.create("r1", &group, &req).await.unwrap_err();

        assert!(matches!(err, PlacementError::UserData { .. }));
        assert!(cloud.calls().servers_created.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_name_fails_before_create() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard().with_images(Vec::new()));
        let group = group(&cloud).await;
        let mut provisioner = Provisioner::new(&cloud, address_policy());

        let err = provisioner.create("r1", &group, &request()).await.unwrap_err();

        assert!(matches!(err, PlacementError::NotFound { .. }));
        assert!(cloud.calls().servers_created.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn public_address_is_polled_until_visible() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard().with_address_polls(3));
        let group = group(&cloud).await;
        let mut provisioner = Provisioner::new(&cloud, address_policy());
        let server = provisioner.create("r1", &group, &request()).await.unwrap();
        let region = RegionConfig::new("r1", "pub-net");
        let start = tokio::time::Instant::now();

        let assignment = provisioner
            .assign_public_address(&region, &server.id)
            .await
            .unwrap();

        assert!(assignment.visible);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        let refreshed = provisioner.refresh("r1", &server.id).await.unwrap();
        assert!(refreshed.has_address(&assignment.floating_ip.address));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_address_is_reported_not_fatal() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard().with_address_polls(500));
        let group = group(&cloud).await;
        let mut provisioner = Provisioner::new(&cloud, address_policy());
        let server = provisioner.create("r1", &group, &request()).await.unwrap();

        let assignment = provisioner
            .assign_public_address(&RegionConfig::new("r1", "pub-net"), &server.id)
            .await
            .unwrap();

        assert!(!assignment.visible);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attach_releases_the_address() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard().with_failing_address_attach());
        let group = group(&cloud).await;
        let mut provisioner = Provisioner::new(&cloud, address_policy());
        let server = provisioner.create("r1", &group, &request()).await.unwrap();

        let err = provisioner
            .assign_public_address(&RegionConfig::new("r1", "pub-net"), &server.id)
            .await
            .unwrap_err();

        assert!(matches!(err, PlacementError::Cloud(_)));
        let calls = cloud.calls();
        assert_eq!(calls.floating_ips.len(), 1);
        assert_eq!(
            calls.floating_ips_released,
            [("r1".to_string(), calls.floating_ips[0].1.id.clone())]
        );
    }

    #[tokio::test]
    async fn cleanup_removes_instance() {
        let cloud = MemoryCloud::new().with_region("r1", RegionBehaviour::standard());
        let group = group(&cloud).await;
        let mut provisioner = Provisioner::new(&cloud, address_policy());
        let server = provisioner.create("r1", &group, &request()).await.unwrap();

        assert_eq!(
            provisioner.cleanup_instance("r1", &server.id).await,
            CleanupOutcome::Removed
        );
        assert!(cloud.live_servers("r1").is_empty());
    }
}
