//! Webhook notification of pass summaries.

use crate::reconciler::{PassSummary, PolicyOutcome, RecordOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Posts a JSON summary of each pass to configured endpoints.
///
/// Notification failures are logged and never affect the pass itself.
pub struct Notifier {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Notification<'a> {
    updated: usize,
    unchanged: usize,
    failed: usize,
    records: &'a [RecordOutcome],
    policies: &'a [PolicyOutcome],
    completed_at: DateTime<Utc>,
}

impl Notifier {
    pub fn new(endpoints: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, endpoints }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Send the summary to every endpoint.
    pub async fn send_summary(&self, summary: &PassSummary) {
        let payload = Notification {
            updated: summary.updated(),
            unchanged: summary.unchanged(),
            failed: summary.failed(),
            records: &summary.records,
            policies: &summary.policies,
            completed_at: summary.completed_at,
        };

        for endpoint in &self.endpoints {
            match self.client.post(endpoint).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!("Notified {}", endpoint);
                }
                Ok(response) => {
                    tracing::warn!("Notification to {} returned HTTP {}", endpoint, response.status());
                }
                Err(e) => {
                    tracing::warn!("Notification to {} failed: {}", endpoint, e);
                }
            }
        }
    }
}
