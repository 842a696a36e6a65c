//! Provider API seam and data model.
//!
//! Records and policies cross this boundary as fully-typed structures with
//! provider-side optional fields defaulted (ttl 1, proxied false), so the
//! reconciler never handles loosely-typed API data.

mod cloudflare;

pub use cloudflare::CloudflareClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// DNS record type; only address records are managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    A,
    AAAA,
}

impl RecordType {
    /// Human-readable address family for this record type.
    pub fn family_name(&self) -> &'static str {
        match self {
            RecordType::A => "IPv4",
            RecordType::AAAA => "IPv6",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::AAAA => write!(f, "AAAA"),
        }
    }
}

/// A DNS record as observed at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_ttl() -> u32 {
    1
}

/// Access policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Allow,
    Deny,
    NonIdentity,
    Bypass,
}

/// One rule inside an access policy's include/exclude/require lists.
///
/// Only IP literals are ever rewritten; every other rule kind round-trips
/// untouched through the `Other` variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRule {
    Ip { ip: String },
    IpList { id: String },
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// An access policy as observed at the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub id: String,
    pub name: String,
    pub decision: PolicyDecision,
    #[serde(default)]
    pub include: Vec<AccessRule>,
    #[serde(default)]
    pub exclude: Vec<AccessRule>,
    #[serde(default)]
    pub require: Vec<AccessRule>,
    /// Account-scoped (reusable) policies are updated through a different
    /// endpoint than application-scoped ones.
    #[serde(default)]
    pub reusable: bool,
}

impl AccessPolicy {
    /// First IP literal among the include rules, if any.
    pub fn include_ip(&self) -> Option<&str> {
        self.include.iter().find_map(|rule| match rule {
            AccessRule::Ip { ip } => Some(ip.as_str()),
            _ => None,
        })
    }

    /// Copy of this policy with every IP-literal include rewritten to `ip`.
    /// IP-list references, exclude, and require rules pass through unchanged.
    pub fn with_include_ip(&self, ip: &str) -> Self {
        let include = self
            .include
            .iter()
            .map(|rule| match rule {
                AccessRule::Ip { .. } => AccessRule::Ip { ip: ip.to_string() },
                other => other.clone(),
            })
            .collect();

        Self {
            include,
            ..self.clone()
        }
    }
}

/// The remote provider operations the reconciler depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// List all records of the given type in a zone.
    async fn list_records(&self, zone_id: &str, record_type: RecordType)
        -> Result<Vec<DnsRecord>>;

    /// Update a record in place, preserving its name, proxied flag, and TTL.
    async fn update_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()>;

    /// List the IP-literal-bearing access policies of an application.
    async fn list_policies(&self, account_id: &str, app_id: &str) -> Result<Vec<AccessPolicy>>;

    /// Submit an updated policy, choosing the reusable or application-scoped
    /// endpoint from the policy's `reusable` flag.
    async fn update_policy(
        &self,
        account_id: &str,
        app_id: &str,
        policy: &AccessPolicy,
    ) -> Result<()>;

    /// Verify API credentials.
    async fn verify_token(&self) -> Result<()>;
}
