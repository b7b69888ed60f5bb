//! hpclaunch-cloud: the provider operations the placement engine consumes.
//!
//! The [`CloudApi`] trait is the seam between placement logic and the
//! cloud. Two implementations ship here:
//!
//! - **`openstack`**: Keystone v3 password auth plus Nova, Neutron and
//!   Glance REST calls, with endpoints discovered from the service catalog
//! - **`memory`**: an in-process cloud with scriptable capacity faults,
//!   activation delays and address propagation, used by the test suites
//!
//! Every operation takes the region explicitly; a single authenticated
//! session serves all regions.

pub mod api;
pub mod error;
pub mod memory;
pub mod openstack;

pub use api::{
    BootVolume, CloudApi, CloudFuture, Fault, FloatingIp, NamedResource, Server, ServerCreate,
    ServerGroup, ServerStatus,
};
pub use error::{CloudError, CloudResult};
pub use memory::{MemoryCloud, RegionBehaviour};
pub use openstack::{AuthOptions, OpenStackCloud};
