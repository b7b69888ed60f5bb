//! Provider interface and the resource shapes it exchanges.
//!
//! [`CloudApi`] is object-safe (boxed futures) so the allocator can hold a
//! `&dyn CloudApi` and tests can swap in [`crate::MemoryCloud`].

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use hpclaunch_core::{Instance, NetworkAddresses};

use crate::error::CloudResult;

/// Boxed future alias for provider calls.
pub type CloudFuture<'a, T> = Pin<Box<dyn Future<Output = CloudResult<T>> + Send + 'a>>;

/// A listed resource that is looked up by name (image, flavor, network).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub id: String,
    pub name: String,
}

impl NamedResource {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A provider-side placement group (Nova server group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub policies: Vec<String>,
}

/// Instance lifecycle status as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Active,
    Build,
    Error,
    Other(String),
}

impl ServerStatus {
    pub fn from_api(status: &str) -> Self {
        match status {
            "ACTIVE" => ServerStatus::Active,
            "BUILD" => ServerStatus::Build,
            "ERROR" => ServerStatus::Error,
            other => ServerStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ServerStatus::Active => "ACTIVE",
            ServerStatus::Build => "BUILD",
            ServerStatus::Error => "ERROR",
            ServerStatus::Other(s) => s,
        }
    }

    /// No further asynchronous transition is expected from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerStatus::Active | ServerStatus::Error)
    }
}

/// Fault the provider attached to a failed instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub code: Option<u16>,
    pub message: String,
}

/// Provider view of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub status: ServerStatus,
    pub fault: Option<Fault>,
    pub addresses: Vec<NetworkAddresses>,
}

impl Server {
    /// Snapshot this server as a placed instance in `region`.
    pub fn to_instance(&self, region: &str) -> Instance {
        Instance {
            region: region.to_string(),
            id: self.id.clone(),
            name: self.name.clone(),
            networks: self.addresses.clone(),
        }
    }

    pub fn has_address(&self, address: &str) -> bool {
        self.addresses
            .iter()
            .any(|n| n.addresses.iter().any(|a| a == address))
    }
}

/// Root volume created from the image at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootVolume {
    pub image_id: String,
    pub size_gb: u32,
    pub delete_on_termination: bool,
}

/// Parameters for a boot-from-volume instance create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCreate {
    pub name: String,
    pub image_id: String,
    pub flavor_id: String,
    pub network_id: String,
    pub key_name: String,
    pub boot_volume: BootVolume,
    /// Placement group passed as the `group` scheduler hint.
    pub group_id: String,
    pub user_data: Option<Vec<u8>>,
}

/// An allocated floating address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingIp {
    pub id: String,
    pub address: String,
}

/// Compute, network and image operations consumed by the placement engine.
///
/// Every call is scoped to `region`.
pub trait CloudApi: Send + Sync {
    fn list_images<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<NamedResource>>;

    fn list_flavors<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<NamedResource>>;

    fn list_networks<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<NamedResource>>;

    fn list_server_groups<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<ServerGroup>>;

    fn create_server_group<'a>(
        &'a self,
        region: &'a str,
        name: &'a str,
        policy: &'a str,
    ) -> CloudFuture<'a, ServerGroup>;

    fn delete_server_group<'a>(&'a self, region: &'a str, group_id: &'a str) -> CloudFuture<'a, ()>;

    /// Issue the create call. The returned server is usually still building.
    fn create_server<'a>(
        &'a self,
        region: &'a str,
        request: &'a ServerCreate,
    ) -> CloudFuture<'a, Server>;

    fn get_server<'a>(&'a self, region: &'a str, server_id: &'a str) -> CloudFuture<'a, Server>;

    fn delete_server<'a>(&'a self, region: &'a str, server_id: &'a str) -> CloudFuture<'a, ()>;

    fn create_floating_ip<'a>(
        &'a self,
        region: &'a str,
        public_network_id: &'a str,
    ) -> CloudFuture<'a, FloatingIp>;

    fn add_floating_ip<'a>(
        &'a self,
        region: &'a str,
        server_id: &'a str,
        address: &'a str,
    ) -> CloudFuture<'a, ()>;

    /// Release an allocated floating address back to the pool.
    fn delete_floating_ip<'a>(&'a self, region: &'a str, floating_ip_id: &'a str) -> CloudFuture<'a, ()>;
}
