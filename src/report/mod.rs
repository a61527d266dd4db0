// Report payload shapes and event derivation
pub mod health;
pub mod package;
pub mod resource;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{DecodeError, EventError};
use crate::types::{AnalyticsEvent, Config};

pub use health::{HealthReport, Node, Unit, unit_total_key, unit_unhealthy_key};
pub use package::{Package, PackageReport};
pub use resource::{Framework, ResourceReport};

pub type Properties = Map<String, Value>;

/// A decoded upstream payload that can be flattened into an analytics event.
pub trait Report: DeserializeOwned + Send + Sync + 'static {
    /// Event name used when this report is delivered.
    fn event_name(config: &Config) -> String;

    /// Adds the report-specific properties on top of the base set.
    fn extend_properties(&self, name: &str, properties: &mut Properties) -> Result<(), EventError>;
}

/// Decodes one response body, insisting that the top level is a JSON object.
pub fn decode_object(body: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Object(fields) => Ok(fields),
        other => Err(DecodeError::NotAnObject {
            found: json_type(&other),
        }),
    }
}

/// Strict decode of a single payload into its typed report.
pub fn decode<R: Report>(body: &[u8]) -> Result<R, DecodeError> {
    let fields = decode_object(body)?;
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Properties every event carries regardless of report kind.
pub fn base_properties(config: &Config) -> Properties {
    let mut properties = Properties::new();
    properties.insert("source".into(), Value::from("cluster"));
    properties.insert("customerKey".into(), Value::from(config.customer_key.clone()));
    properties.insert("environmentVersion".into(), Value::from(config.dcos_version.clone()));
    properties.insert("clusterId".into(), Value::from(config.cluster_id.clone()));
    properties.insert("variant".into(), Value::from(config.variant.to_string()));
    properties.insert("provider".into(), Value::from(config.provider.clone()));
    if let Some(license_id) = &config.license_id {
        properties.insert("licenseId".into(), Value::from(license_id.clone()));
    }
    if let Some(platform) = &config.platform {
        properties.insert("platform".into(), Value::from(platform.clone()));
    }
    properties
}

/// Builds the event for a reporter's current payload. A missing payload is
/// reported as `EmptyReport`, never as an empty event.
pub fn derive_event<R: Report>(
    name: &str,
    report: Option<&R>,
    config: &Config,
) -> Result<AnalyticsEvent, EventError> {
    let report = report.ok_or_else(|| EventError::EmptyReport { name: name.to_string() })?;
    let mut properties = base_properties(config);
    report.extend_properties(name, &mut properties)?;

    Ok(AnalyticsEvent {
        event: R::event_name(config),
        user_id: config.customer_key.clone(),
        anonymous_id: config.cluster_id.clone(),
        properties,
    })
}

/// Upstream services serialize empty maps and lists as `null`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Variant;

    fn config() -> Config {
        Config {
            customer_key: "12345".to_string(),
            cluster_id: "anon".to_string(),
            dcos_version: "test_version".to_string(),
            variant: Variant::Enterprise,
            provider: "test_provider".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_decode_object_rejects_non_objects() {
        for (body, found) in [
            (&b"\"foo\""[..], "a string"),
            (&b"[1, 2]"[..], "an array"),
            (&b"null"[..], "null"),
            (&b"42"[..], "a number"),
        ] {
            let err = decode_object(body).unwrap_err();
            match err {
                DecodeError::NotAnObject { found: f } => assert_eq!(f, found),
                other => panic!("unexpected error: {}", other),
            }
        }
    }

    #[test]
    fn test_decode_object_malformed_json() {
        let err = decode_object(b"{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_base_properties() {
        let props = base_properties(&config());
        assert_eq!(props["source"], "cluster");
        assert_eq!(props["customerKey"], "12345");
        assert_eq!(props["environmentVersion"], "test_version");
        assert_eq!(props["clusterId"], "anon");
        assert_eq!(props["variant"], "enterprise");
        assert_eq!(props["provider"], "test_provider");
        // License and platform are only present when known
        assert!(!props.contains_key("licenseId"));
        assert!(!props.contains_key("platform"));

        let mut cfg = config();
        cfg.license_id = Some("test_license".to_string());
        cfg.platform = Some("aws".to_string());
        let props = base_properties(&cfg);
        assert_eq!(props["licenseId"], "test_license");
        assert_eq!(props["platform"], "aws");
    }

    #[test]
    fn test_derive_event_without_report() {
        let err = derive_event::<PackageReport>("cosmos", None, &config()).unwrap_err();
        assert!(matches!(err, EventError::EmptyReport { ref name } if name == "cosmos"));
    }

    #[test]
    fn test_derive_event_identities() {
        let report: PackageReport = decode(br#"{"packages": [{"appId": "/kafka"}]}"#).unwrap();
        let event = derive_event("cosmos", Some(&report), &config()).unwrap();
        assert_eq!(event.event, "package_list");
        assert_eq!(event.user_id, "12345");
        assert_eq!(event.anonymous_id, "anon");
    }
}
