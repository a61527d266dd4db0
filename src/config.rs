use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{Config, TestMode, Variant, DEFAULT_SEGMENT_URL};

pub const DEFAULT_CONFIG_PATH: &str = "/opt/mesosphere/etc/dcos-signal-config.json";
pub const DEFAULT_EXTRA_CONFIG_PATH: &str = "/opt/mesosphere/etc/dcos-signal-extra.json";
pub const DEFAULT_CLUSTER_ID_PATH: &str = "/var/lib/dcos/cluster-id";

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory environment for tests
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Keys understood in the JSON config files. Every key is optional; the extra
/// file overlays the main one key by key.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    diagnostics_urls: Option<Vec<String>>,
    cosmos_urls: Option<Vec<String>>,
    mesos_urls: Option<Vec<String>>,
    ca_cert_path: Option<PathBuf>,
    customer_key: Option<String>,
    cluster_id: Option<String>,
    license_id: Option<String>,
    gen_platform: Option<String>,
    gen_provider: Option<String>,
    enabled: Option<serde_json::Value>,
    extra_headers: Option<HashMap<String, String>>,
}

impl FileConfig {
    fn overlay(&mut self, other: FileConfig) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            diagnostics_urls, cosmos_urls, mesos_urls, ca_cert_path, customer_key, cluster_id,
            license_id, gen_platform, gen_provider, enabled, extra_headers
        );
    }
}

pub fn load_config() -> Result<(Config, Vec<ConfigError>)> {
    load_config_with_env(&SystemEnvironment)
}

/// Builds the run configuration. Hard errors (unparseable values) fail the
/// load; unreadable files are returned alongside the config so the caller
/// can log them and still run.
pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<(Config, Vec<ConfigError>)> {
    let mut issues = Vec::new();
    let mut cfg = Config::default();

    cfg.variant = match env.get_var("DCOS_VARIANT") {
        Some(v) => v
            .parse::<Variant>()
            .context("Invalid DCOS_VARIANT, only 'open' or 'enterprise' are allowed")?,
        None => Variant::Open,
    };

    if let Some(secs) = env.get_var("SIGNAL_FETCH_TIMEOUT_SECS") {
        let secs: u64 = secs.trim().parse().context("Invalid SIGNAL_FETCH_TIMEOUT_SECS")?;
        cfg.fetch_timeout = Duration::from_secs(secs);
    }

    let cluster_id_path = path_var(env, "CLUSTER_ID_PATH", DEFAULT_CLUSTER_ID_PATH);
    match std::fs::read_to_string(&cluster_id_path) {
        Ok(id) => cfg.cluster_id = id.trim().to_string(),
        Err(source) => issues.push(ConfigError::ReadFile { path: cluster_id_path, source }),
    }

    let mut file = FileConfig::default();
    let config_path = path_var(env, "SIGNAL_CONFIG_PATH", DEFAULT_CONFIG_PATH);
    match read_file_config(&config_path) {
        Ok(Some(main)) => file.overlay(main),
        Ok(None) => issues.push(ConfigError::ReadFile {
            path: config_path,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
        }),
        Err(e) => issues.push(e),
    }
    let extra_path = path_var(env, "SIGNAL_EXTRA_CONFIG_PATH", DEFAULT_EXTRA_CONFIG_PATH);
    match read_file_config(&extra_path) {
        Ok(Some(extra)) => file.overlay(extra),
        Ok(None) => {}
        Err(e) => issues.push(e),
    }
    apply_file_config(&mut cfg, file, &mut issues);

    cfg.master_url = env.get_var("SIGNAL_MASTER_URL").filter(|s| !s.trim().is_empty());
    cfg.auth_token = env.get_var("SIGNAL_AUTH_TOKEN").filter(|s| !s.trim().is_empty());
    if cfg.variant == Variant::Enterprise {
        if let Some(token) = &cfg.auth_token {
            cfg.extra_headers.insert("Authorization".to_string(), format!("token={}", token));
        }
    }

    cfg.segment_key = env.get_var("SEGMENT_KEY").unwrap_or_default();
    if let Some(event) = env.get_var("SEGMENT_EVENT").filter(|s| !s.is_empty()) {
        cfg.segment_event = event;
    }
    cfg.segment_url = env.get_var("SEGMENT_URL").unwrap_or_else(|| DEFAULT_SEGMENT_URL.to_string());
    cfg.dcos_version = env.get_var("DCOS_VERSION").unwrap_or_default();

    cfg.verbose = env.get_var("SIGNAL_VERBOSE").map(|v| is_truthy(&v)).unwrap_or(false);
    let test_flag = env.get_var("SIGNAL_TEST").map(|v| is_truthy(&v)).unwrap_or(false);
    cfg.test_mode = match env.get_var("SIGNAL_TEST_URL").filter(|s| !s.trim().is_empty()) {
        Some(url) => TestMode::Post(url),
        None if test_flag => TestMode::Stdout,
        None => TestMode::Off,
    };

    Ok((cfg, issues))
}

fn apply_file_config(cfg: &mut Config, file: FileConfig, issues: &mut Vec<ConfigError>) {
    cfg.diagnostics_urls = file.diagnostics_urls.unwrap_or_default();
    cfg.cosmos_urls = file.cosmos_urls.unwrap_or_default();
    cfg.mesos_urls = file.mesos_urls.unwrap_or_default();
    if let Some(id) = file.cluster_id {
        cfg.cluster_id = id;
    }
    cfg.customer_key = file.customer_key.unwrap_or_default();
    cfg.license_id = file.license_id.filter(|s| !s.is_empty());
    cfg.platform = file.gen_platform.filter(|s| !s.is_empty());
    cfg.provider = file.gen_provider.unwrap_or_default();
    cfg.extra_headers = file.extra_headers.unwrap_or_default();
    cfg.enabled = match file.enabled {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::String(s)) => s.trim() != "false",
        _ => true,
    };

    if let Some(path) = file.ca_cert_path.filter(|p| !p.as_os_str().is_empty()) {
        match std::fs::read(&path) {
            Ok(pem) if is_pem_bundle(&pem) => cfg.ca_bundle = Some(pem),
            // Peers go unverified rather than failing the run
            Ok(_) => issues.push(ConfigError::InvalidValue {
                key: "ca_cert_path".to_string(),
                value: format!("{} (no PEM certificates)", path.display()),
            }),
            Err(source) => issues.push(ConfigError::ReadFile { path: path.clone(), source }),
        }
        cfg.ca_cert_path = Some(path);
    }
}

/// `Ok(None)` when the file does not exist.
fn read_file_config(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(ConfigError::ReadFile { path: path.to_path_buf(), source }),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn path_var<E: EnvironmentProvider>(env: &E, key: &str, default: &str) -> PathBuf {
    env.get_var(key)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

pub(crate) fn is_pem_bundle(pem: &[u8]) -> bool {
    String::from_utf8_lossy(pem).contains("-----BEGIN CERTIFICATE-----")
}

fn is_truthy(v: &str) -> bool {
    matches!(v, "1" | "true" | "TRUE" | "True")
}
