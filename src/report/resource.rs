use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{null_as_default, Properties, Report};
use crate::error::EventError;
use crate::types::Config;

/// Resource usage assembled from the master's `/frameworks` and
/// `/metrics/snapshot` endpoints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResourceReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub frameworks: Vec<Framework>,
    #[serde(rename = "master/cpus_total", default)]
    pub cpu_total: f64,
    #[serde(rename = "master/cpus_used", default)]
    pub cpu_used: f64,
    #[serde(rename = "master/disk_total", default)]
    pub disk_total: f64,
    #[serde(rename = "master/disk_used", default)]
    pub disk_used: f64,
    #[serde(rename = "master/mem_total", default)]
    pub mem_total: f64,
    #[serde(rename = "master/mem_used", default)]
    pub mem_used: f64,
    #[serde(rename = "master/tasks_running", default)]
    pub task_count: f64,
    #[serde(rename = "master/frameworks_active", default)]
    pub framework_count: f64,
    #[serde(rename = "master/slaves_connected", default)]
    pub agents_connected: f64,
    #[serde(rename = "master/slaves_active", default)]
    pub agents_active: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Framework {
    pub name: String,
}

// Accepts both `"marathon"` and `{"name": "marathon", ...}`.
impl<'de> Deserialize<'de> for Framework {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Object { name: String },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Name(name) | Repr::Object { name } => Framework { name },
        })
    }
}

impl Report for ResourceReport {
    fn event_name(_config: &Config) -> String {
        "mesos_track".to_string()
    }

    fn extend_properties(
        &self,
        _name: &str,
        properties: &mut Properties,
    ) -> Result<(), EventError> {
        let frameworks = self.frameworks.iter().map(|f| Value::from(f.name.clone())).collect();
        properties.insert("frameworks".into(), Value::Array(frameworks));

        let gauges = [
            ("cpu_total", self.cpu_total),
            ("cpu_used", self.cpu_used),
            ("mem_total", self.mem_total),
            ("mem_used", self.mem_used),
            ("disk_total", self.disk_total),
            ("disk_used", self.disk_used),
            ("task_count", self.task_count),
            ("framework_count", self.framework_count),
            ("agents_connected", self.agents_connected),
            ("agents_active", self.agents_active),
        ];
        for (key, value) in gauges {
            properties.insert(key.into(), Value::from(value));
        }
        Ok(())
    }
}
