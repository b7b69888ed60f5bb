//! Request and response bodies for the Nova, Neutron and Glance calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hpclaunch_core::NetworkAddresses;

use crate::api::{Fault, NamedResource, Server, ServerGroup, ServerStatus};

// ── Listings ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct FlavorList {
    pub flavors: Vec<NamedResource>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NetworkList {
    pub networks: Vec<NamedResource>,
}

/// Glance allows unnamed images, and pages with a relative `next` link.
#[derive(Debug, Deserialize)]
pub(crate) struct ImageList {
    pub images: Vec<ImageBody>,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageBody {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerGroupList {
    pub server_groups: Vec<ServerGroup>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerGroupEnvelope {
    pub server_group: ServerGroup,
}

// ── Server groups ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct CreateServerGroup<'a> {
    pub server_group: NewServerGroup<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewServerGroup<'a> {
    pub name: &'a str,
    pub policies: [&'a str; 1],
}

// ── Servers ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct CreateServer<'a> {
    pub server: NewServer<'a>,
    #[serde(rename = "os:scheduler_hints")]
    pub scheduler_hints: SchedulerHints<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewServer<'a> {
    pub name: &'a str,
    #[serde(rename = "imageRef")]
    pub image_ref: &'a str,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: &'a str,
    pub key_name: &'a str,
    pub networks: [NetworkRef<'a>; 1],
    pub block_device_mapping_v2: [BlockDeviceMapping<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NetworkRef<'a> {
    pub uuid: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct BlockDeviceMapping<'a> {
    pub boot_index: u32,
    pub uuid: &'a str,
    pub source_type: &'static str,
    pub destination_type: &'static str,
    pub volume_size: u32,
    pub delete_on_termination: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SchedulerHints<'a> {
    pub group: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerEnvelope {
    pub server: ServerBody,
}

/// Nova omits most fields from the create response, so everything but the
/// id is optional.
#[derive(Debug, Deserialize)]
pub(crate) struct ServerBody {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub fault: Option<FaultBody>,
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<AddressBody>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FaultBody {
    pub code: Option<u16>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddressBody {
    pub addr: String,
}

impl ServerBody {
    pub fn into_server(self, fallback_name: &str) -> Server {
        Server {
            id: self.id,
            name: self.name.unwrap_or_else(|| fallback_name.to_string()),
            status: self
                .status
                .as_deref()
                .map(ServerStatus::from_api)
                .unwrap_or(ServerStatus::Build),
            fault: self.fault.map(|f| Fault {
                code: f.code,
                message: f.message.unwrap_or_default(),
            }),
            addresses: self
                .addresses
                .into_iter()
                .map(|(network, addrs)| NetworkAddresses {
                    network,
                    addresses: addrs.into_iter().map(|a| a.addr).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AddFloatingIpAction<'a> {
    #[serde(rename = "addFloatingIp")]
    pub add_floating_ip: AddressRef<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddressRef<'a> {
    pub address: &'a str,
}

// ── Floating IPs ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct CreateFloatingIp<'a> {
    pub floatingip: NewFloatingIp<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewFloatingIp<'a> {
    pub floating_network_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FloatingIpEnvelope {
    pub floatingip: FloatingIpBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FloatingIpBody {
    pub id: String,
    pub floating_ip_address: String,
}
