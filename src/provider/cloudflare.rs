//! Cloudflare v4 API client.

use super::{AccessPolicy, AccessRule, DnsRecord, PolicyDecision, ProviderApi, RecordType};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com";

/// Every provider call carries a bounded timeout so a stuck call cannot
/// stall a pass indefinitely.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloudflare API client.
pub struct CloudflareClient {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    result: Option<T>,
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Serialize)]
struct RecordUpdateRequest<'a> {
    #[serde(rename = "type")]
    record_type: RecordType,
    name: &'a str,
    content: &'a str,
    proxied: bool,
    ttl: u32,
}

#[derive(Debug, Serialize)]
struct PolicyUpdateRequest<'a> {
    name: &'a str,
    decision: PolicyDecision,
    include: &'a [AccessRule],
    exclude: &'a [AccessRule],
    require: &'a [AccessRule],
}

impl CloudflareClient {
    /// Create a new client.
    pub fn new(api_token: String) -> Self {
        Self::with_base_url(api_token, DEFAULT_BASE_URL.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(api_token: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_token,
            base_url,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.api_token))
    }

    fn put(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .put(url)
            .header("Authorization", format!("Bearer {}", self.api_token))
    }

    /// Parse the `{success, result, errors}` envelope and extract the result.
    async fn parse_result<T: DeserializeOwned>(
        &self,
        context: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let body: ApiResponse<T> = response.json().await?;

        if !body.success {
            return Err(SyncError::provider(context, first_error(&body.errors)));
        }

        body.result
            .ok_or_else(|| SyncError::provider(context, "Missing result in response"))
    }

    /// Parse the envelope, requiring success but discarding the result.
    async fn ensure_success(&self, context: &str, response: reqwest::Response) -> Result<()> {
        let body: ApiResponse<serde_json::Value> = response.json().await?;

        if !body.success {
            return Err(SyncError::provider(context, first_error(&body.errors)));
        }

        Ok(())
    }
}

fn first_error(errors: &[ApiError]) -> String {
    errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "Unknown error".to_string())
}

#[async_trait]
impl ProviderApi for CloudflareClient {
    async fn list_records(
        &self,
        zone_id: &str,
        record_type: RecordType,
    ) -> Result<Vec<DnsRecord>> {
        let url = format!(
            "{}/client/v4/zones/{}/dns_records?type={}",
            self.base_url, zone_id, record_type
        );

        let response = self.get(&url).send().await?;
        self.parse_result(&format!("zone {}", zone_id), response).await
    }

    async fn update_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()> {
        let url = format!(
            "{}/client/v4/zones/{}/dns_records/{}",
            self.base_url, zone_id, record.id
        );

        let request = RecordUpdateRequest {
            record_type: record.record_type,
            name: &record.name,
            content: &record.content,
            proxied: record.proxied,
            ttl: record.ttl,
        };

        let response = self.put(&url).json(&request).send().await?;
        self.ensure_success(&format!("record {}", record.name), response)
            .await
    }

    async fn list_policies(&self, account_id: &str, app_id: &str) -> Result<Vec<AccessPolicy>> {
        let url = format!(
            "{}/client/v4/accounts/{}/access/apps/{}/policies",
            self.base_url, account_id, app_id
        );

        let response = self.get(&url).send().await?;
        let policies: Vec<AccessPolicy> = self
            .parse_result(&format!("app {}", app_id), response)
            .await?;

        // Only policies carrying an IP literal can be synchronized.
        Ok(policies
            .into_iter()
            .filter(|p| p.include_ip().is_some())
            .collect())
    }

    async fn update_policy(
        &self,
        account_id: &str,
        app_id: &str,
        policy: &AccessPolicy,
    ) -> Result<()> {
        // Reusable (account-scoped) policies live under a different path
        // than application-scoped ones.
        let url = if policy.reusable {
            format!(
                "{}/client/v4/accounts/{}/access/policies/{}",
                self.base_url, account_id, policy.id
            )
        } else {
            format!(
                "{}/client/v4/accounts/{}/access/apps/{}/policies/{}",
                self.base_url, account_id, app_id, policy.id
            )
        };

        let request = PolicyUpdateRequest {
            name: &policy.name,
            decision: policy.decision,
            include: &policy.include,
            exclude: &policy.exclude,
            require: &policy.require,
        };

        let response = self.put(&url).json(&request).send().await?;
        self.ensure_success(&format!("policy {}", policy.name), response)
            .await
    }

    async fn verify_token(&self) -> Result<()> {
        let url = format!("{}/client/v4/user/tokens/verify", self.base_url);

        let response = self.get(&url).send().await?;
        self.ensure_success("token verification", response).await
    }
}
