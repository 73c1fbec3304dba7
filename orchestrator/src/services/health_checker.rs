//! HTTP health gate for the backends under test

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::error::BenchResult;
use crate::traits::{HealthChecker, HealthEndpoint, HealthReport};
use shared::{process_error, process_info, BackendAuth, ProcessId};

/// Default per-request timeout
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Health checker backed by a shared reqwest client
#[derive(Clone)]
pub struct HttpHealthChecker {
    client: reqwest::Client,
}

impl HttpHealthChecker {
    pub fn new(timeout: Duration) -> BenchResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// One GET; error statuses count as failures
    async fn request(&self, endpoint: &HealthEndpoint) -> Result<StatusCode, reqwest::Error> {
        let mut request = self.client.get(&endpoint.url);
        request = match &endpoint.auth {
            Some(BackendAuth::Basic { username, password }) => request.basic_auth(username, Some(password)),
            Some(BackendAuth::Header { value }) => request.header(reqwest::header::AUTHORIZATION, value),
            None => request,
        };

        let response = request.send().await?.error_for_status()?;
        Ok(response.status())
    }
}

#[async_trait]
impl HealthChecker for HttpHealthChecker {
    async fn check_services_healthy(&self, endpoints: &[HealthEndpoint]) -> HealthReport {
        if endpoints.is_empty() {
            process_error!(ProcessId::Runner, "No health endpoints configured, nothing to check");
        }

        let mut report = HealthReport::default();
        for endpoint in endpoints {
            report.checked += 1;
            match self.request(endpoint).await {
                Ok(status) => {
                    process_info!(ProcessId::Runner, "  {}: OK ({})", endpoint.name, status.as_u16());
                }
                Err(e) => {
                    process_error!(ProcessId::Runner, "  {}: FAILED ({})", endpoint.name, e);
                    report.failed.push(endpoint.name.clone());
                }
            }
        }
        report
    }
}
