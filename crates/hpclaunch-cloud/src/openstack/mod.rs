//! OpenStack provider: Keystone v3 auth, Nova, Neutron and Glance.

mod auth;
mod client;
mod wire;

pub use auth::{AuthOptions, Catalog};
pub use client::OpenStackCloud;
