use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{null_as_default, Properties, Report};
use crate::error::EventError;
use crate::types::Config;

/// Payload of the package manager's `/package/list` endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PackageReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub packages: Vec<Package>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub package_information: Option<PackageInformation>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInformation {
    pub package_definition: PackageDefinition,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PackageDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl Package {
    /// Identifier reported for the package: the app id, or the package name
    /// for responses that only carry package information.
    pub fn identifier(&self) -> Option<&str> {
        self.app_id.as_deref().or_else(|| {
            self.package_information
                .as_ref()
                .map(|i| i.package_definition.name.as_str())
        })
    }
}

impl PackageReport {
    pub fn identifiers(&self) -> Vec<String> {
        self.packages
            .iter()
            .filter_map(|p| p.identifier())
            .map(str::to_string)
            .collect()
    }
}

/// Renders `name version` pairs, e.g. `hello-world 0.0.1, test-pkg 0.0.2`.
impl fmt::Display for PackageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .packages
            .iter()
            .filter_map(|p| p.package_information.as_ref())
            .map(|i| format!("{} {}", i.package_definition.name, i.package_definition.version))
            .collect();
        f.write_str(&entries.join(", "))
    }
}

impl Report for PackageReport {
    fn event_name(_config: &Config) -> String {
        "package_list".to_string()
    }

    fn extend_properties(&self, name: &str, properties: &mut Properties) -> Result<(), EventError> {
        debug!("{} installed packages: {}", name, self);
        let list = self.identifiers().into_iter().map(Value::from).collect();
        properties.insert("package_list".into(), Value::Array(list));
        Ok(())
    }
}
