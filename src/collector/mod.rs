use reqwest::{Certificate, Client, Method, Url};
use tracing::{debug, error};

use crate::config::is_pem_bundle;
use crate::error::{FetchError, RunError};
use crate::reporter::Reporter;
use crate::types::Config;

/// Pulls reports from upstream services. One collector is built per run and
/// cloned into every worker; it holds no per-reporter state.
#[derive(Debug, Clone)]
pub struct Collector {
    client: Client,
    /// Base for relative endpoints, or why there is none.
    master_url: Result<Url, String>,
    auth_token: Option<String>,
}

impl Collector {
    /// Builds the shared client. An unusable CA bundle is logged and peers go
    /// unverified. A bad master URL is logged and fails relative endpoints
    /// only. Only a client that cannot be built at all is an error.
    pub fn new(config: &Config) -> Result<Self, RunError> {
        let mut builder = Client::builder().timeout(config.fetch_timeout);

        builder = match config.ca_bundle.as_deref().map(load_ca_bundle) {
            Some(Ok(cert)) => builder.tls_built_in_root_certs(false).add_root_certificate(cert),
            Some(Err(reason)) => {
                error!("{}, peer certificates will not be verified", reason);
                builder.danger_accept_invalid_certs(true)
            }
            // Intra-cluster endpoints: without a CA bundle, peers are not verified
            None => builder.danger_accept_invalid_certs(true),
        };

        let client = builder.build().map_err(|e| RunError::Client(e.to_string()))?;
        let master_url = match config.master_url.as_deref() {
            Some(raw) => Url::parse(raw).map_err(|e| {
                let reason = format!("master url '{}' is invalid: {}", raw, e);
                error!("{}", reason);
                reason
            }),
            None => Err("no master url configured".to_string()),
        };

        Ok(Self {
            client,
            master_url,
            auth_token: config.auth_token.clone(),
        })
    }

    /// Fetches every endpoint of `reporter` in declared order, feeding each
    /// body into the reporter. Stops at the first failing endpoint.
    pub async fn pull(&self, reporter: &mut dyn Reporter) -> Result<(), FetchError> {
        if reporter.endpoints().is_empty() {
            return Err(FetchError::NoEndpoints {
                name: reporter.name().to_string(),
            });
        }

        let endpoints = reporter.endpoints().to_vec();
        for endpoint in &endpoints {
            let body = self.fetch_endpoint(&*reporter, endpoint).await?;
            reporter.ingest(&body).map_err(|source| FetchError::Decode {
                endpoint: endpoint.clone(),
                source,
            })?;
        }
        Ok(())
    }

    async fn fetch_endpoint(
        &self,
        reporter: &dyn Reporter,
        endpoint: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.resolve(endpoint)?;
        let method = Method::from_bytes(reporter.method().as_bytes()).map_err(|e| {
            FetchError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("method {}: {}", reporter.method(), e),
            }
        })?;

        let mut req = self.client.request(method.clone(), url.clone());
        for (name, value) in reporter.headers() {
            req = req.header(name.as_str(), value.as_str());
        }
        // Headers from the extra config may already carry credentials
        let has_auth = reporter
            .headers()
            .keys()
            .any(|k| k.eq_ignore_ascii_case("authorization"));
        if url.scheme() == "https" && !has_auth {
            let token = self
                .auth_token
                .as_deref()
                .ok_or_else(|| FetchError::MissingCredentials {
                    endpoint: endpoint.to_string(),
                })?;
            req = req.header(reqwest::header::AUTHORIZATION, format!("token={}", token));
        }
        if method != Method::GET {
            req = req.body("{}");
        }

        debug!("{} {} for {}", method, url, reporter.name());
        let resp = req.send().await.map_err(|source| FetchError::Request {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }
        let body = resp.bytes().await.map_err(|source| FetchError::Body {
            endpoint: endpoint.to_string(),
            source,
        })?;
        debug!("{} responded {} ({} bytes)", endpoint, status, body.len());
        Ok(body.to_vec())
    }

    /// Absolute endpoints are used as-is; anything else is joined onto the
    /// master URL.
    pub fn resolve(&self, endpoint: &str) -> Result<Url, FetchError> {
        let invalid = |reason: String| FetchError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Url::parse(endpoint).map_err(|e| invalid(e.to_string()));
        }
        let base = self
            .master_url
            .as_ref()
            .map_err(|reason| invalid(format!("relative endpoint, {}", reason)))?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| invalid(e.to_string()))
    }
}

fn load_ca_bundle(pem: &[u8]) -> Result<Certificate, String> {
    if !is_pem_bundle(pem) {
        return Err("CA bundle contains no PEM certificates".to_string());
    }
    Certificate::from_pem(pem).map_err(|e| format!("CA bundle: {}", e))
}
