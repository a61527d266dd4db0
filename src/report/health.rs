use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{null_as_default, Properties, Report};
use crate::error::EventError;
use crate::types::Config;

/// Payload of the diagnostics `/system/health/v1/report` endpoint. Field names
/// are the upstream's own, unmodified.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HealthReport {
    #[serde(rename = "Units", default, deserialize_with = "null_as_default")]
    pub units: BTreeMap<String, Unit>,
    #[serde(rename = "Nodes", default, deserialize_with = "null_as_default")]
    pub nodes: BTreeMap<String, Node>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Unit {
    #[serde(rename = "UnitName", default)]
    pub unit_name: String,
    #[serde(rename = "Nodes", default, deserialize_with = "null_as_default")]
    pub nodes: Vec<Node>,
    #[serde(rename = "Health", default)]
    pub health: i64,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Node {
    #[serde(rename = "Role", default)]
    pub role: String,
    #[serde(rename = "IP", alias = "Ip", alias = "ip", default)]
    pub ip: String,
    #[serde(rename = "Host", default)]
    pub host: String,
    #[serde(rename = "Health", default)]
    pub health: i64,
    #[serde(rename = "Output", default, deserialize_with = "null_as_default")]
    pub output: HashMap<String, String>,
    #[serde(rename = "Units", default, deserialize_with = "null_as_default")]
    pub units: Vec<Unit>,
}

impl Node {
    /// A node is unhealthy for a unit when its own health code is nonzero, or
    /// when one of its nested observations of that unit is.
    pub fn is_unhealthy_for(&self, unit_name: &str) -> bool {
        if self.health != 0 {
            return true;
        }
        self.units
            .iter()
            .any(|u| u.unit_name == unit_name && u.health != 0)
    }
}

impl Unit {
    pub fn unhealthy_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| {
                let unhealthy = node.is_unhealthy_for(&self.unit_name);
                if unhealthy {
                    debug!(
                        "unhealthy node {} for {}: {}",
                        node.ip,
                        self.unit_name,
                        node.output.get(&self.unit_name).map(String::as_str).unwrap_or("")
                    );
                }
                unhealthy
            })
            .count()
    }
}

/// Property key for the number of nodes reporting on a unit:
/// `health-unit-<unit with dots as dashes>-total`.
pub fn unit_total_key(name: &str) -> String {
    format!("health-unit-{}-total", name.replace('.', "-"))
}

/// Property key for the number of unhealthy nodes of a unit.
pub fn unit_unhealthy_key(name: &str) -> String {
    format!("health-unit-{}-unhealthy", name.replace('.', "-"))
}

impl Report for HealthReport {
    fn event_name(config: &Config) -> String {
        config.segment_event.clone()
    }

    fn extend_properties(&self, name: &str, properties: &mut Properties) -> Result<(), EventError> {
        for unit in self.units.values() {
            if unit.unit_name.is_empty() {
                return Err(EventError::MissingField {
                    name: name.to_string(),
                    field: "UnitName",
                });
            }
            properties.insert(unit_total_key(&unit.unit_name), Value::from(unit.nodes.len()));
            properties.insert(
                unit_unhealthy_key(&unit.unit_name),
                Value::from(unit.unhealthy_nodes()),
            );
        }
        Ok(())
    }
}
