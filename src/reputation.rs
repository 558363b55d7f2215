//! VirusTotal IP reputation lookups.
//!
//! The public v2 API allows a handful of requests per minute, so every
//! request is followed by a fixed pause before the result is returned.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::config::{ReputationConfig, SecureString};
use crate::error::InformerError;

/// What the reputation service knows about an IP.
///
/// Every field is `None` when the service had nothing to say about it,
/// which is distinct from a present-but-empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReputationReport {
    pub has_known_malicious_urls: Option<bool>,
    pub malware_sample_count: Option<usize>,
    pub malware_communication_count: Option<usize>,
    /// Comma-joined hostnames the IP resolved for
    pub associated_hostnames: Option<String>,
}

impl ReputationReport {
    /// True if the service returned any information at all
    pub fn is_known(&self) -> bool {
        self != &Self::default()
    }
}

/// Per-IP reputation source
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReputationLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<ReputationReport>;
}

#[derive(Debug, Deserialize)]
struct VtIpReport {
    response_code: Option<i64>,
    detected_urls: Option<Vec<IgnoredAny>>,
    detected_downloaded_samples: Option<Vec<IgnoredAny>>,
    detected_communicating_samples: Option<Vec<IgnoredAny>>,
    resolutions: Option<Vec<VtResolution>>,
}

#[derive(Debug, Deserialize)]
struct VtResolution {
    hostname: Option<String>,
}

/// Decode a v2 `ip-address/report` body.
///
/// `response_code != 1` means the IP is unknown and maps to an empty report.
pub fn parse_report(body: &str) -> Result<ReputationReport> {
    let report: VtIpReport =
        serde_json::from_str(body).context("Failed to decode reputation response")?;

    if report.response_code != Some(1) {
        return Ok(ReputationReport::default());
    }

    let hostnames = report.resolutions.map(|resolutions| {
        resolutions
            .into_iter()
            .filter_map(|r| r.hostname)
            .collect::<Vec<_>>()
            .join(",")
    });

    Ok(ReputationReport {
        has_known_malicious_urls: report.detected_urls.map(|urls| !urls.is_empty()),
        malware_sample_count: report.detected_downloaded_samples.map(|s| s.len()),
        malware_communication_count: report.detected_communicating_samples.map(|s| s.len()),
        associated_hostnames: hostnames,
    })
}

/// VirusTotal v2 client with mandatory request pacing
pub struct VirusTotalClient {
    client: Client,
    endpoint: String,
    api_key: SecureString,
    delay: Duration,
}

impl VirusTotalClient {
    pub fn new(config: &ReputationConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("ipinformer/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.get_api_key(),
            delay: Duration::from_secs(config.delay_secs),
        })
    }

    /// Override the pause enforced after each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    async fn query(&self, ip: &str) -> Result<ReputationReport> {
        debug!("Requesting reputation for {}", ip);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("apikey", self.api_key.as_str()), ("ip", ip)])
            .send()
            .await
            .map_err(|e| InformerError::Reputation(format!("request for {} failed: {}", ip, e)))?;

        // 204 is how the public API reports an exceeded quota
        let status = response.status();
        if !status.is_success() || status == reqwest::StatusCode::NO_CONTENT {
            return Err(InformerError::Reputation(format!("HTTP {} for {}", status, ip)).into());
        }

        let body = response
            .text()
            .await
            .context("Failed to read reputation response")?;
        parse_report(&body)
    }
}

#[async_trait]
impl ReputationLookup for VirusTotalClient {
    async fn lookup(&self, ip: &str) -> Result<ReputationReport> {
        let result = self.query(ip).await;

        if !self.delay.is_zero() {
            debug!("Enforcing {:?} delay before the next reputation request", self.delay);
            tokio::time::sleep(self.delay).await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use std::time::Instant;

    fn client(endpoint: &str, delay: Duration) -> VirusTotalClient {
        let config = ReputationConfig {
            enabled: true,
            api_key: SecureString::from("test-key"),
            ..Default::default()
        };
        VirusTotalClient::new(&config, Duration::from_secs(5))
            .unwrap()
            .with_endpoint(endpoint)
            .with_delay(delay)
    }

    #[test]
    fn test_parse_known_ip() {
        let body = r#"{
            "response_code": 1,
            "verbose_msg": "IP address in dataset",
            "detected_urls": [{"url": "http://bad.example/", "positives": 3}],
            "detected_downloaded_samples": [{"sha256": "a"}, {"sha256": "b"}],
            "detected_communicating_samples": [{"sha256": "c"}],
            "resolutions": [
                {"last_resolved": "2014-03-10 00:00:00", "hostname": "a.example"},
                {"last_resolved": "2014-03-11 00:00:00", "hostname": "b.example"}
            ]
        }"#;
        let report = parse_report(body).unwrap();
        assert_eq!(report.has_known_malicious_urls, Some(true));
        assert_eq!(report.malware_sample_count, Some(2));
        assert_eq!(report.malware_communication_count, Some(1));
        assert_eq!(
            report.associated_hostnames.as_deref(),
            Some("a.example,b.example")
        );
        assert!(report.is_known());
    }

    #[test]
    fn test_parse_unknown_ip() {
        let body = r#"{"response_code": 0, "verbose_msg": "IP address not in dataset"}"#;
        let report = parse_report(body).unwrap();
        assert_eq!(report, ReputationReport::default());
        assert!(!report.is_known());
    }

    #[test]
    fn test_parse_missing_response_code() {
        let report = parse_report(r#"{"detected_urls": [{}]}"#).unwrap();
        assert!(!report.is_known());
    }

    #[test]
    fn test_parse_absent_vs_empty_fields() {
        let body = r#"{"response_code": 1, "detected_urls": [], "resolutions": []}"#;
        let report = parse_report(body).unwrap();
        assert_eq!(report.has_known_malicious_urls, Some(false));
        assert_eq!(report.associated_hostnames.as_deref(), Some(""));
        assert_eq!(report.malware_sample_count, None);
        assert_eq!(report.malware_communication_count, None);
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(parse_report("<html>quota exceeded</html>").is_err());
    }

    #[tokio::test]
    async fn test_lookup_against_server() {
        let base = serve(
            "200 OK",
            r#"{"response_code": 1, "detected_communicating_samples": [{}, {}]}"#,
        )
        .await;
        let vt = client(&format!("{}/vtapi/v2/ip-address/report", base), Duration::ZERO);
        let report = vt.lookup("5.6.7.8").await.unwrap();
        assert_eq!(report.malware_communication_count, Some(2));
    }

    #[tokio::test]
    async fn test_lookup_quota_exceeded_is_error() {
        let base = serve("204 No Content", "").await;
        let vt = client(&base, Duration::ZERO);
        assert!(vt.lookup("5.6.7.8").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_lookup_still_paced() {
        let vt = client("http://127.0.0.1:1/report", Duration::from_millis(200));
        let start = Instant::now();
        assert!(vt.lookup("5.6.7.8").await.is_err());
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_successful_lookup_paced() {
        let base = serve("200 OK", r#"{"response_code": 0}"#).await;
        let vt = client(&base, Duration::from_millis(150));
        let start = Instant::now();
        vt.lookup("1.1.1.1").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(150));
    }
}
