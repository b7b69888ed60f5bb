//! Report rendering.

use clap::ValueEnum;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use hpclaunch_core::Instance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// One placed instance as printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct InstanceRow {
    pub region_name: String,
    pub instance_id: String,
    pub instance_name: String,
    pub networks: String,
}

impl From<&Instance> for InstanceRow {
    fn from(instance: &Instance) -> Self {
        Self {
            region_name: instance.region.clone(),
            instance_id: instance.id.clone(),
            instance_name: instance.name.clone(),
            networks: instance.networks_display(),
        }
    }
}

pub fn render(instances: &[Instance], format: OutputFormat) -> anyhow::Result<String> {
    let rows: Vec<InstanceRow> = instances.iter().map(InstanceRow::from).collect();
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&rows)?),
        OutputFormat::Table => Ok(Table::new(rows).with(Style::psql()).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpclaunch_core::NetworkAddresses;

    fn instance() -> Instance {
        Instance {
            region: "nz-por-1".into(),
            id: "6f1c0a52".into(),
            name: "instance-0".into(),
            networks: vec![NetworkAddresses {
                network: "private-net".into(),
                addresses: vec!["10.0.0.12".into(), "203.0.113.40".into()],
            }],
        }
    }

    #[test]
    fn table_has_report_columns() {
        let table = render(&[instance()], OutputFormat::Table).unwrap();
        let header = table.lines().next().unwrap();
        for column in ["region_name", "instance_id", "instance_name", "networks"] {
            assert!(header.contains(column), "missing {column} in {header}");
        }
        assert!(table.contains("private-net=10.0.0.12, 203.0.113.40"));
    }

    #[test]
    fn empty_report_still_prints_header() {
        let table = render(&[], OutputFormat::Table).unwrap();
        assert!(table.contains("region_name"));
    }

    #[test]
    fn json_rows_use_column_names() {
        let json = render(&[instance()], OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["region_name"], "nz-por-1");
        assert_eq!(parsed[0]["instance_id"], "6f1c0a52");
        assert_eq!(parsed[0]["networks"], "private-net=10.0.0.12, 203.0.113.40");
    }
}
