//! In-process cloud with scriptable behaviour per region.
//!
//! `MemoryCloud` keeps groups, servers and floating addresses in memory
//! and records every mutating call, so tests can assert exactly what the
//! placement engine asked the provider to do. Each region is described by
//! a [`RegionBehaviour`]: what it lists, how many instances one group can
//! hold before the scheduler reports a capacity fault, and how long
//! instances and attached addresses take to show up.

use std::collections::BTreeMap;
use std::future::ready;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hpclaunch_core::NetworkAddresses;

use crate::api::{
    CloudApi, CloudFuture, Fault, FloatingIp, NamedResource, Server, ServerCreate, ServerGroup,
    ServerStatus,
};
use crate::error::{CloudError, CloudResult};

/// Fault message Nova attaches when the scheduler cannot honour a group.
pub const NO_VALID_HOST: &str = "No valid host was found. There are not enough hosts available.";

/// How one region of the in-memory cloud behaves.
#[derive(Debug, Clone)]
pub struct RegionBehaviour {
    pub images: Vec<NamedResource>,
    pub flavors: Vec<NamedResource>,
    pub networks: Vec<NamedResource>,
    /// Live instances one group may hold; further creates fault with
    /// [`NO_VALID_HOST`]. `None` means unlimited.
    pub group_capacity: Option<u32>,
    /// `get_server` calls that still report `BUILD` after create.
    pub activation_polls: u32,
    /// Every instance ends in `ERROR` with this fault.
    pub build_fault: Option<String>,
    /// `create_server` is rejected with this message.
    pub create_error: Option<String>,
    /// `get_server` calls before an attached floating address is visible.
    pub address_polls: u32,
    pub fail_group_create: bool,
    pub fail_group_delete: bool,
    /// `add_floating_ip` is rejected.
    pub fail_address_attach: bool,
}

impl RegionBehaviour {
    /// A healthy region listing `ubuntu-16.04-x86_64`, `c1.c1r1` and
    /// `private-net`, with unlimited capacity.
    pub fn standard() -> Self {
        Self {
            images: vec![NamedResource::new("img-ubuntu-1604", "ubuntu-16.04-x86_64")],
            flavors: vec![NamedResource::new("flv-c1c1r1", "c1.c1r1")],
            networks: vec![NamedResource::new("net-private", "private-net")],
            group_capacity: None,
            activation_polls: 0,
            build_fault: None,
            create_error: None,
            address_polls: 0,
            fail_group_create: false,
            fail_group_delete: false,
            fail_address_attach: false,
        }
    }

    pub fn with_group_capacity(mut self, capacity: u32) -> Self {
        self.group_capacity = Some(capacity);
        self
    }

    pub fn with_activation_polls(mut self, polls: u32) -> Self {
        self.activation_polls = polls;
        self
    }

    pub fn with_build_fault(mut self, message: impl Into<String>) -> Self {
        self.build_fault = Some(message.into());
        self
    }

    pub fn with_create_error(mut self, message: impl Into<String>) -> Self {
        self.create_error = Some(message.into());
        self
    }

    pub fn with_address_polls(mut self, polls: u32) -> Self {
        self.address_polls = polls;
        self
    }

    pub fn with_images(mut self, images: Vec<NamedResource>) -> Self {
        self.images = images;
        self
    }

    pub fn with_failing_group_create(mut self) -> Self {
        self.fail_group_create = true;
        self
    }

    pub fn with_failing_group_delete(mut self) -> Self {
        self.fail_group_delete = true;
        self
    }

    pub fn with_failing_address_attach(mut self) -> Self {
        self.fail_address_attach = true;
        self
    }
}

impl Default for RegionBehaviour {
    fn default() -> Self {
        Self::standard()
    }
}

/// Mutating calls the cloud has served, in order.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    /// (region, group) for every group created.
    pub groups_created: Vec<(String, ServerGroup)>,
    /// (region, group id) for every group deleted.
    pub groups_deleted: Vec<(String, String)>,
    /// (region, request) for every accepted create.
    pub servers_created: Vec<(String, ServerCreate)>,
    /// (region, server id) for every server deleted.
    pub servers_deleted: Vec<(String, String)>,
    /// (region, address) for every floating address allocated.
    pub floating_ips: Vec<(String, FloatingIp)>,
    /// (region, floating ip id) for every address released.
    pub floating_ips_released: Vec<(String, String)>,
    pub server_gets: u32,
}

impl CallLog {
    /// Creates issued in `region`, in order.
    pub fn creates_in(&self, region: &str) -> Vec<&ServerCreate> {
        self.servers_created
            .iter()
            .filter(|(r, _)| r == region)
            .map(|(_, c)| c)
            .collect()
    }
}

struct MemoryServer {
    region: String,
    group_id: String,
    server: Server,
    build_polls_left: u32,
    final_status: ServerStatus,
    final_fault: Option<Fault>,
    /// (address, gets before it becomes visible)
    pending_addresses: Vec<(String, u32)>,
}

#[derive(Default)]
struct MemoryState {
    regions: BTreeMap<String, RegionBehaviour>,
    next_id: u64,
    groups: Vec<(String, ServerGroup)>,
    servers: BTreeMap<String, MemoryServer>,
    log: CallLog,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn region(&self, region: &str) -> CloudResult<&RegionBehaviour> {
        self.regions.get(region).ok_or_else(|| CloudError::EndpointNotFound {
            service: "compute".to_string(),
            region: region.to_string(),
        })
    }

    fn server_mut(&mut self, region: &str, server_id: &str) -> CloudResult<&mut MemoryServer> {
        self.servers
            .get_mut(server_id)
            .filter(|s| s.region == region)
            .ok_or_else(|| not_found(format!("Instance {server_id} could not be found.")))
    }

    /// Live (non-errored) members of a group.
    fn group_members(&self, group_id: &str) -> u32 {
        self.servers
            .values()
            .filter(|s| s.group_id == group_id && s.final_status != ServerStatus::Error)
            .count() as u32
    }
}

fn not_found(message: String) -> CloudError {
    CloudError::Api {
        status: 404,
        message,
    }
}

fn done<'a, T: Send + 'a>(result: CloudResult<T>) -> CloudFuture<'a, T> {
    Box::pin(ready(result))
}

/// An in-memory [`CloudApi`].
#[derive(Default)]
pub struct MemoryCloud {
    state: Mutex<MemoryState>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a region.
    pub fn with_region(self, name: impl Into<String>, behaviour: RegionBehaviour) -> Self {
        self.state().regions.insert(name.into(), behaviour);
        self
    }

    /// Pre-create a group, as if left behind by an earlier run.
    pub fn seed_server_group(&self, region: &str, name: &str) -> ServerGroup {
        let mut state = self.state();
        let id = state.next_id();
        let group = ServerGroup {
            id: format!("grp-{id}"),
            name: name.to_string(),
            policies: vec!["anti-affinity".to_string()],
        };
        state.groups.push((region.to_string(), group.clone()));
        group
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> CallLog {
        self.state().log.clone()
    }

    /// Groups currently present in `region`.
    pub fn live_groups(&self, region: &str) -> Vec<ServerGroup> {
        self.state()
            .groups
            .iter()
            .filter(|(r, _)| r == region)
            .map(|(_, g)| g.clone())
            .collect()
    }

    /// Ids of servers currently present in `region`.
    pub fn live_servers(&self, region: &str) -> Vec<String> {
        self.state()
            .servers
            .iter()
            .filter(|(_, s)| s.region == region)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn list_with(
        &self,
        region: &str,
        pick: impl Fn(&RegionBehaviour) -> &Vec<NamedResource>,
    ) -> CloudResult<Vec<NamedResource>> {
        let state = self.state();
        Ok(pick(state.region(region)?).clone())
    }

    fn do_create_server(&self, region: &str, request: &ServerCreate) -> CloudResult<Server> {
        let mut state = self.state();
        let behaviour = state.region(region)?.clone();

        if let Some(message) = &behaviour.create_error {
            return Err(CloudError::Api {
                status: 500,
                message: message.clone(),
            });
        }
        if !state
            .groups
            .iter()
            .any(|(r, g)| r == region && g.id == request.group_id)
        {
            return Err(CloudError::Api {
                status: 400,
                message: format!("Invalid server group {}", request.group_id),
            });
        }
        let network = behaviour
            .networks
            .iter()
            .find(|n| n.id == request.network_id)
            .ok_or_else(|| CloudError::Api {
                status: 400,
                message: format!("Network {} could not be found.", request.network_id),
            })?
            .name
            .clone();

        let at_capacity = behaviour
            .group_capacity
            .is_some_and(|cap| state.group_members(&request.group_id) >= cap);

        let (final_status, final_fault) = if at_capacity {
            (
                ServerStatus::Error,
                Some(Fault {
                    code: Some(500),
                    message: NO_VALID_HOST.to_string(),
                }),
            )
        } else if let Some(message) = &behaviour.build_fault {
            (
                ServerStatus::Error,
                Some(Fault {
                    code: Some(500),
                    message: message.clone(),
                }),
            )
        } else {
            (ServerStatus::Active, None)
        };

        let n = state.next_id();
        let server = Server {
            id: format!("srv-{n}"),
            name: request.name.clone(),
            status: ServerStatus::Build,
            fault: None,
            addresses: vec![NetworkAddresses {
                network,
                addresses: vec![format!("10.0.{}.{}", n / 250, n % 250 + 2)],
            }],
        };

        state.servers.insert(
            server.id.clone(),
            MemoryServer {
                region: region.to_string(),
                group_id: request.group_id.clone(),
                server: server.clone(),
                build_polls_left: behaviour.activation_polls,
                final_status,
                final_fault,
                pending_addresses: Vec::new(),
            },
        );
        state
            .log
            .servers_created
            .push((region.to_string(), request.clone()));

        Ok(server)
    }

    fn do_get_server(&self, region: &str, server_id: &str) -> CloudResult<Server> {
        let mut state = self.state();
        state.log.server_gets += 1;
        let entry = state.server_mut(region, server_id)?;

        if entry.build_polls_left > 0 {
            entry.build_polls_left -= 1;
        } else {
            entry.server.status = entry.final_status.clone();
            entry.server.fault = entry.final_fault.clone();
        }

        let mut visible = Vec::new();
        entry.pending_addresses.retain_mut(|(address, polls)| {
            if *polls == 0 {
                visible.push(address.clone());
                false
            } else {
                *polls -= 1;
                true
            }
        });
        if !visible.is_empty() {
            match entry.server.addresses.first_mut() {
                Some(first) => first.addresses.extend(visible),
                None => entry.server.addresses.push(NetworkAddresses {
                    network: "public".to_string(),
                    addresses: visible,
                }),
            }
        }

        Ok(entry.server.clone())
    }

    fn do_delete_server(&self, region: &str, server_id: &str) -> CloudResult<()> {
        let mut state = self.state();
        state.server_mut(region, server_id)?;
        state.servers.remove(server_id);
        state
            .log
            .servers_deleted
            .push((region.to_string(), server_id.to_string()));
        Ok(())
    }

    fn do_create_group(&self, region: &str, name: &str, policy: &str) -> CloudResult<ServerGroup> {
        let mut state = self.state();
        if state.region(region)?.fail_group_create {
            return Err(CloudError::Api {
                status: 500,
                message: "Unexpected API Error.".to_string(),
            });
        }
        let id = state.next_id();
        let group = ServerGroup {
            id: format!("grp-{id}"),
            name: name.to_string(),
            policies: vec![policy.to_string()],
        };
        state.groups.push((region.to_string(), group.clone()));
        state
            .log
            .groups_created
            .push((region.to_string(), group.clone()));
        Ok(group)
    }

    fn do_delete_group(&self, region: &str, group_id: &str) -> CloudResult<()> {
        let mut state = self.state();
        if state.region(region)?.fail_group_delete {
            return Err(CloudError::Api {
                status: 403,
                message: "Policy doesn't allow os_compute_api:os-server-groups:delete to be performed."
                    .to_string(),
            });
        }
        let before = state.groups.len();
        state
            .groups
            .retain(|(r, g)| !(r == region && g.id == group_id));
        if state.groups.len() == before {
            return Err(not_found(format!("Server group {group_id} could not be found.")));
        }
        state
            .log
            .groups_deleted
            .push((region.to_string(), group_id.to_string()));
        Ok(())
    }

    fn do_create_floating_ip(&self, region: &str, public_network_id: &str) -> CloudResult<FloatingIp> {
        let mut state = self.state();
        state.region(region)?;
        if public_network_id.is_empty() {
            return Err(CloudError::Api {
                status: 400,
                message: "floating_network_id is required".to_string(),
            });
        }
        let n = state.next_id();
        let ip = FloatingIp {
            id: format!("fip-{n}"),
            address: format!("203.0.113.{}", n % 250 + 1),
        };
        state.log.floating_ips.push((region.to_string(), ip.clone()));
        Ok(ip)
    }

    fn do_add_floating_ip(&self, region: &str, server_id: &str, address: &str) -> CloudResult<()> {
        let mut state = self.state();
        let behaviour = state.region(region)?;
        if behaviour.fail_address_attach {
            return Err(CloudError::Api {
                status: 409,
                message: format!("External network is not reachable from the port of instance {server_id}."),
            });
        }
        let lag = behaviour.address_polls;
        let entry = state.server_mut(region, server_id)?;
        entry.pending_addresses.push((address.to_string(), lag));
        Ok(())
    }
}

impl MemoryCloud {
    fn do_delete_floating_ip(&self, region: &str, floating_ip_id: &str) -> CloudResult<()> {
        let mut state = self.state();
        state.region(region)?;
        let allocated = state
            .log
            .floating_ips
            .iter()
            .any(|(r, ip)| r == region && ip.id == floating_ip_id);
        let released = state
            .log
            .floating_ips_released
            .iter()
            .any(|(r, id)| r == region && id == floating_ip_id);
        if !allocated || released {
            return Err(not_found(format!("Floating IP {floating_ip_id} could not be found.")));
        }
        state
            .log
            .floating_ips_released
            .push((region.to_string(), floating_ip_id.to_string()));
        Ok(())
    }
}

impl CloudApi for MemoryCloud {
    fn list_images<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<NamedResource>> {
        done(self.list_with(region, |b| &b.images))
    }

    fn list_flavors<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<NamedResource>> {
        done(self.list_with(region, |b| &b.flavors))
    }

    fn list_networks<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<NamedResource>> {
        done(self.list_with(region, |b| &b.networks))
    }

    fn list_server_groups<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<ServerGroup>> {
        let result = self.state().region(region).map(|_| ());
        done(result.map(|()| self.live_groups(region)))
    }

    fn create_server_group<'a>(
        &'a self,
        region: &'a str,
        name: &'a str,
        policy: &'a str,
    ) -> CloudFuture<'a, ServerGroup> {
        done(self.do_create_group(region, name, policy))
    }

    fn delete_server_group<'a>(&'a self, region: &'a str, group_id: &'a str) -> CloudFuture<'a, ()> {
        done(self.do_delete_group(region, group_id))
    }

    fn create_server<'a>(
        &'a self,
        region: &'a str,
        request: &'a ServerCreate,
    ) -> CloudFuture<'a, Server> {
        done(self.do_create_server(region, request))
    }

    fn get_server<'a>(&'a self, region: &'a str, server_id: &'a str) -> CloudFuture<'a, Server> {
        done(self.do_get_server(region, server_id))
    }

    fn delete_server<'a>(&'a self, region: &'a str, server_id: &'a str) -> CloudFuture<'a, ()> {
        done(self.do_delete_server(region, server_id))
    }

    fn create_floating_ip<'a>(
        &'a self,
        region: &'a str,
        public_network_id: &'a str,
    ) -> CloudFuture<'a, FloatingIp> {
        done(self.do_create_floating_ip(region, public_network_id))
    }

    fn add_floating_ip<'a>(
        &'a self,
        region: &'a str,
        server_id: &'a str,
        address: &'a str,
    ) -> CloudFuture<'a, ()> {
        done(self.do_add_floating_ip(region, server_id, address))
    }

    fn delete_floating_ip<'a>(&'a self, region: &'a str, floating_ip_id: &'a str) -> CloudFuture<'a, ()> {
        done(self.do_delete_floating_ip(region, floating_ip_id))
    }
}
