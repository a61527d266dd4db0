use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SEGMENT_URL: &str = "https://api.segment.io/v1/track";

/// Immutable context for one signal run. Built once before any reporter runs
/// and shared read-only with every worker.
#[derive(Debug, Clone)]
pub struct Config {
    // Endpoints per reporter kind
    pub diagnostics_urls: Vec<String>,
    pub cosmos_urls: Vec<String>,
    pub mesos_urls: Vec<String>,
    pub master_url: Option<String>,

    // Transport
    pub ca_cert_path: Option<PathBuf>,
    pub ca_bundle: Option<Vec<u8>>,
    pub auth_token: Option<String>,
    pub extra_headers: HashMap<String, String>,
    pub fetch_timeout: Duration,

    // Analytics labelling
    pub segment_key: String,
    pub segment_event: String,
    pub segment_url: String,
    pub customer_key: String,
    pub cluster_id: String,
    pub license_id: Option<String>,
    pub dcos_version: String,
    pub variant: Variant,
    pub platform: Option<String>,
    pub provider: String,

    pub verbose: bool,
    pub test_mode: TestMode,
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            diagnostics_urls: Vec::new(),
            cosmos_urls: Vec::new(),
            mesos_urls: Vec::new(),
            master_url: None,
            ca_cert_path: None,
            ca_bundle: None,
            auth_token: None,
            extra_headers: HashMap::new(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            segment_key: String::new(),
            segment_event: "health".to_string(),
            segment_url: DEFAULT_SEGMENT_URL.to_string(),
            customer_key: String::new(),
            cluster_id: String::new(),
            license_id: None,
            dcos_version: String::new(),
            variant: Variant::Open,
            platform: None,
            provider: String::new(),
            verbose: false,
            test_mode: TestMode::Off,
            enabled: true,
        }
    }
}

impl Config {
    pub fn is_test(&self) -> bool {
        !matches!(self.test_mode, TestMode::Off)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Open,
    Enterprise,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Open => f.write_str("open"),
            Variant::Enterprise => f.write_str("enterprise"),
        }
    }
}

impl FromStr for Variant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "open" => Ok(Variant::Open),
            "enterprise" => Ok(Variant::Enterprise),
            other => Err(ConfigError::InvalidValue {
                key: "DCOS_VARIANT".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Where a dry run sends its output instead of the analytics sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestMode {
    Off,
    Stdout,
    Post(String),
}

/// Flat record delivered to the analytics sink. Serializes with the field
/// names of the Segment track call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event: String,
    pub user_id: String,
    pub anonymous_id: String,
    pub properties: serde_json::Map<String, serde_json::Value>,
}
