//! hpclaunch-core: shared types and configuration for hpclaunch.
//!
//! Holds the placement domain model (regions, requests, outcomes, placed
//! instances) and the `launch.toml` configuration consumed by the
//! placement engine and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use config::{LaunchConfig, PlacementConfig, PollingConfig};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
