use std::collections::HashMap;

use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{DecodeError, EventError, RunError};
use crate::report::{self, HealthReport, PackageReport, Report, ResourceReport};
use crate::types::{AnalyticsEvent, Config};

pub const PACKAGE_LIST_REQUEST: &str =
    "application/vnd.dcos.package.list-request+json;charset=utf-8;version=v1";
pub const PACKAGE_LIST_RESPONSE: &str =
    "application/vnd.dcos.package.list-response+json;charset=utf-8;version=v1";

/// Uniform surface the runner drives, whatever kind of report sits behind it.
pub trait Reporter: Send + Sync {
    fn name(&self) -> &str;
    fn endpoints(&self) -> &[String];
    fn method(&self) -> &str;
    fn headers(&self) -> &HashMap<String, String>;
    /// Adds `extra` to the headers. Names compare case-insensitively and
    /// incoming values replace existing ones.
    fn merge_headers(&mut self, extra: &HashMap<String, String>);

    /// Decodes a response body and merges it into the stored payload.
    fn ingest(&mut self, body: &[u8]) -> Result<(), DecodeError>;
    fn has_report(&self) -> bool;

    fn build_event(&mut self, config: &Config) -> Result<(), EventError>;
    /// `None` until `build_event` has succeeded.
    fn event(&self) -> Option<&AnalyticsEvent>;

    fn record_error(&mut self, message: String);
    fn errors(&self) -> &[String];
}

/// A reporter backed by one typed report.
///
/// Payloads from consecutive endpoints are merged at the top level of the
/// JSON object: a later response replaces any field an earlier one set, and
/// leaves the others alone.
#[derive(Debug)]
pub struct ReportSource<R> {
    name: String,
    endpoints: Vec<String>,
    method: String,
    headers: HashMap<String, String>,
    raw: Option<Map<String, Value>>,
    report: Option<R>,
    event: Option<AnalyticsEvent>,
    errors: Vec<String>,
}

pub type HealthReporter = ReportSource<HealthReport>;
pub type PackageReporter = ReportSource<PackageReport>;
pub type ResourceReporter = ReportSource<ResourceReport>;

impl<R: Report> ReportSource<R> {
    pub fn new(name: impl Into<String>, endpoints: Vec<String>, method: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints,
            method: method.into(),
            headers: HashMap::new(),
            raw: None,
            report: None,
            event: None,
            errors: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn report(&self) -> Option<&R> {
        self.report.as_ref()
    }
}

impl<R: Report> Reporter for ReportSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    fn merge_headers(&mut self, extra: &HashMap<String, String>) {
        for (k, v) in extra {
            self.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(k));
            self.headers.insert(k.clone(), v.clone());
        }
    }

    fn ingest(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        let fields = report::decode_object(body)?;
        let mut merged = self.raw.clone().unwrap_or_default();
        merged.extend(fields);

        // Only commit once the merged payload decodes
        let report: R = serde_json::from_value(Value::Object(merged.clone()))?;
        self.raw = Some(merged);
        self.report = Some(report);
        Ok(())
    }

    fn has_report(&self) -> bool {
        self.report.is_some()
    }

    fn build_event(&mut self, config: &Config) -> Result<(), EventError> {
        let event = report::derive_event(&self.name, self.report.as_ref(), config)?;
        debug!("{} event {}: {} properties", self.name, event.event, event.properties.len());
        self.event = Some(event);
        Ok(())
    }

    fn event(&self) -> Option<&AnalyticsEvent> {
        self.event.as_ref()
    }

    fn record_error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Builds the reporters for one run: one per service kind, with the global
/// extra headers merged over each reporter's defaults.
pub fn make_reporters(config: &Config) -> Result<Vec<Box<dyn Reporter>>, RunError> {
    validate_headers(&config.extra_headers)?;

    if config.diagnostics_urls.len() != 1 {
        warn!("diagnostics needs 1 endpoint, got {}", config.diagnostics_urls.len());
    }
    if config.mesos_urls.len() != 2 {
        warn!("mesos needs 2 endpoints, got {}", config.mesos_urls.len());
    }

    let mut reporters: Vec<Box<dyn Reporter>> = vec![
        Box::new(
            HealthReporter::new("diagnostics", config.diagnostics_urls.clone(), "GET")
                .with_header("content-type", "application/json"),
        ),
        Box::new(
            PackageReporter::new("cosmos", config.cosmos_urls.clone(), "POST")
                .with_header("content-type", PACKAGE_LIST_REQUEST)
                .with_header("accept", PACKAGE_LIST_RESPONSE),
        ),
        Box::new(
            ResourceReporter::new("mesos", config.mesos_urls.clone(), "GET")
                .with_header("content-type", "application/json"),
        ),
    ];

    for r in reporters.iter_mut() {
        r.merge_headers(&config.extra_headers);
    }

    Ok(reporters)
}

fn validate_headers(headers: &HashMap<String, String>) -> Result<(), RunError> {
    for (name, value) in headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RunError::Reporters(format!("header name '{}': {}", name, e)))?;
        HeaderValue::from_str(value)
            .map_err(|e| RunError::Reporters(format!("header '{}' value: {}", name, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_reporter() -> ResourceReporter {
        let endpoints = vec!["/frameworks".into(), "/metrics/snapshot".into()];
        ResourceReporter::new("mesos", endpoints, "GET")
    }

    #[test]
    fn test_ingest_merges_top_level_fields() {
        let mut r = resource_reporter();
        r.ingest(br#"{"frameworks": ["marathon"], "master/cpus_total": 4}"#).unwrap();
        r.ingest(br#"{"master/cpus_total": 10, "master/mem_total": 2048}"#).unwrap();

        let report = r.report().unwrap();
        assert_eq!(report.frameworks.len(), 1); // kept from the first payload
        assert_eq!(report.cpu_total, 10.0); // later write wins
        assert_eq!(report.mem_total, 2048.0);
    }

    #[test]
    fn test_failed_ingest_leaves_payload_unset() {
        let mut r = HealthReporter::new("diagnostics", vec!["/health".into()], "GET");
        assert!(r.ingest(b"\"foo\"").is_err());
        assert!(!r.has_report());
        assert!(r.report().is_none());
    }

    #[test]
    fn test_failed_ingest_keeps_previous_payload() {
        let mut r = resource_reporter();
        r.ingest(br#"{"master/cpus_total": 4}"#).unwrap();
        assert!(r.ingest(br#"{"frameworks": 12}"#).is_err());
        assert_eq!(r.report().unwrap().cpu_total, 4.0);
        assert!(r.report().unwrap().frameworks.is_empty());
    }

    #[test]
    fn test_build_event_before_ingest() {
        let mut r = resource_reporter();
        let err = r.build_event(&Config::default()).unwrap_err();
        assert!(matches!(err, EventError::EmptyReport { .. }));
        assert!(r.event().is_none());
    }

    #[test]
    fn test_build_event_is_idempotent() {
        let cfg = Config {
            customer_key: "12345".into(),
            cluster_id: "anon".into(),
            ..Config::default()
        };
        let mut r = resource_reporter();
        r.ingest(br#"{"frameworks": ["a", "b"], "master/tasks_running": 3}"#).unwrap();

        r.build_event(&cfg).unwrap();
        let first = serde_json::to_vec(&r.event().unwrap().properties).unwrap();
        r.build_event(&cfg).unwrap();
        let second = serde_json::to_vec(&r.event().unwrap().properties).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_errors_accumulate() {
        let mut r = resource_reporter();
        assert!(r.errors().is_empty());
        r.record_error("first".into());
        r.record_error("second".into());
        assert_eq!(r.errors(), ["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_merge_headers_overwrites() {
        let mut r = resource_reporter().with_header("content-type", "application/json");
        let extra = HashMap::from([
            ("content-type".to_string(), "text/plain".to_string()),
            ("Authorization".to_string(), "token=abc".to_string()),
        ]);
        r.merge_headers(&extra);
        assert_eq!(r.headers()["content-type"], "text/plain");
        assert_eq!(r.headers()["Authorization"], "token=abc");
    }

    #[test]
    fn test_merge_headers_ignores_name_case() {
        let mut r = resource_reporter().with_header("content-type", "application/json");
        let extra = HashMap::from([("Content-Type".to_string(), "text/plain".to_string())]);
        r.merge_headers(&extra);
        assert_eq!(r.headers().len(), 1);
        assert_eq!(r.headers()["Content-Type"], "text/plain");
    }

    #[test]
    fn test_make_reporters() {
        let cfg = Config {
            diagnostics_urls: vec!["/system/health/v1/report".into()],
            cosmos_urls: vec!["/package/list".into()],
            mesos_urls: vec!["/mesos/frameworks".into(), "/mesos/metrics/snapshot".into()],
            extra_headers: HashMap::from([("x-extra".to_string(), "1".to_string())]),
            ..Config::default()
        };
        let reporters = make_reporters(&cfg).unwrap();
        let names: Vec<&str> = reporters.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["diagnostics", "cosmos", "mesos"]);

        let cosmos = &reporters[1];
        assert_eq!(cosmos.method(), "POST");
        assert_eq!(cosmos.headers()["content-type"], PACKAGE_LIST_REQUEST);
        assert_eq!(cosmos.headers()["accept"], PACKAGE_LIST_RESPONSE);
        assert!(reporters.iter().all(|r| r.headers()["x-extra"] == "1"));
        assert_eq!(reporters[2].endpoints().len(), 2);
    }

    #[test]
    fn test_make_reporters_rejects_bad_headers() {
        let cfg = Config {
            extra_headers: HashMap::from([("bad header".to_string(), "1".to_string())]),
            ..Config::default()
        };
        assert!(matches!(make_reporters(&cfg), Err(RunError::Reporters(_))));
    }
}
