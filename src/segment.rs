use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::error::{RunError, SinkError};
use crate::types::AnalyticsEvent;

/// Destination for built events.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn send(&self, event: &AnalyticsEvent) -> Result<(), SinkError>;
}

/// Sends track calls to Segment's HTTP API. A client is built for each send
/// and dropped with it.
#[derive(Debug, Clone)]
pub struct SegmentSink {
    write_key: String,
    url: String,
}

impl SegmentSink {
    pub fn new(write_key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            write_key: write_key.into(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl AnalyticsSink for SegmentSink {
    async fn send(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
        let client = Client::new();
        let res = client
            .post(&self.url)
            .basic_auth(&self.write_key, Some(""))
            .json(event)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }
        debug!("delivered {} event", event.event);
        Ok(())
    }
}

/// Renders the dry-run dump: reporter name -> built event.
pub fn render_test_output(dump: &BTreeMap<String, AnalyticsEvent>) -> Result<String, RunError> {
    Ok(serde_json::to_string_pretty(dump)?)
}

pub async fn post_test_output(url: &str, rendered: String) -> Result<(), SinkError> {
    info!("posting test output to {}", url);
    let client = Client::new();
    let res = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(rendered)
        .send()
        .await?;
    let status = res.status();
    info!("test server response: {}", status);
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(SinkError::Status { status, body });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> AnalyticsEvent {
        let mut properties = serde_json::Map::new();
        properties.insert("source".into(), json!("cluster"));
        AnalyticsEvent {
            event: "health".into(),
            user_id: "12345".into(),
            anonymous_id: "anon".into(),
            properties,
        }
    }

    #[test]
    fn test_event_wire_shape() {
        let value = serde_json::to_value(event()).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "health",
                "userId": "12345",
                "anonymousId": "anon",
                "properties": {"source": "cluster"}
            })
        );
    }

    #[test]
    fn test_render_test_output() {
        let mut dump = BTreeMap::new();
        dump.insert("diagnostics".to_string(), event());
        let rendered = render_test_output(&dump).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["diagnostics"]["userId"], "12345");

        let empty = render_test_output(&BTreeMap::new()).unwrap();
        assert_eq!(empty, "{}");
    }
}
