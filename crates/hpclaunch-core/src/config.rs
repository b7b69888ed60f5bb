//! launch.toml configuration parser.
//!
//! Every section is optional; an empty file yields the stock region set
//! and polling budgets.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::RegionConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaunchConfig {
    /// Regions in priority order. The first entry is tried first for
    /// every ordinal.
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionConfig>,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlacementConfig {
    /// Name prefix for generation groups. Existing groups carrying it are
    /// swept when a new generation starts.
    pub group_prefix: String,
    pub group_policy: String,
    /// Substring of an instance fault message that signals the region
    /// cannot place more instances in the current group.
    pub capacity_fault_marker: String,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            group_prefix: "AF-".to_string(),
            group_policy: "anti-affinity".to_string(),
            capacity_fault_marker: "No valid host".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub active_budget_secs: u64,
    pub active_interval_secs: u64,
    pub address_budget_secs: u64,
    pub address_interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            active_budget_secs: 60,
            active_interval_secs: 3,
            address_budget_secs: 30,
            address_interval_secs: 2,
        }
    }
}

impl PollingConfig {
    pub fn active_budget(&self) -> Duration {
        Duration::from_secs(self.active_budget_secs)
    }

    pub fn active_interval(&self) -> Duration {
        Duration::from_secs(self.active_interval_secs)
    }

    pub fn address_budget(&self) -> Duration {
        Duration::from_secs(self.address_budget_secs)
    }

    pub fn address_interval(&self) -> Duration {
        Duration::from_secs(self.address_interval_secs)
    }
}

fn default_regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig::new("nz-hlz-1", "f10ad6de-a26d-4c29-8c64-2a7418d47f8f"),
        RegionConfig::new("nz-por-1", "849ab1e9-7ac5-4618-8801-e6176fbbcf30"),
        RegionConfig::new("nz_wlg_2", "e0ba6b88-5360-492c-9c3d-119948356fd3"),
    ]
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            placement: PlacementConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl LaunchConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: LaunchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.regions.is_empty() {
            return Err(ConfigError::Invalid("at least one region is required".into()));
        }

        let mut seen = HashSet::new();
        for region in &self.regions {
            if region.name.is_empty() {
                return Err(ConfigError::Invalid("region name must not be empty".into()));
            }
            if !seen.insert(region.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "region {} listed more than once",
                    region.name
                )));
            }
        }

        if self.placement.group_prefix.is_empty() {
            return Err(ConfigError::Invalid("placement.group_prefix must not be empty".into()));
        }

        let p = &self.polling;
        for (label, interval, budget) in [
            ("active", p.active_interval_secs, p.active_budget_secs),
            ("address", p.address_interval_secs, p.address_budget_secs),
        ] {
            if interval == 0 {
                return Err(ConfigError::Invalid(format!(
                    "polling.{label}_interval_secs must be greater than zero"
                )));
            }
            if interval > budget {
                return Err(ConfigError::Invalid(format!(
                    "polling.{label}_interval_secs exceeds polling.{label}_budget_secs"
                )));
            }
        }

        Ok(())
    }

    /// Look up a configured region by name.
    pub fn region(&self, name: &str) -> Option<&RegionConfig> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn region_names(&self) -> Vec<String> {
        self.regions.iter().map(|r| r.name.clone()).collect()
    }
}
