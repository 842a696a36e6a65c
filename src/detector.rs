//! Public IP detection.

use crate::config::Config;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// The caller's current public addresses, one per family.
///
/// A family that could not be resolved is simply absent; resolution of one
/// family never depends on the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublicIps {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

/// Source of the current public addresses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Resolve both address families concurrently.
    ///
    /// Never fails: a lookup failure yields `None` for that family only.
    /// Retry policy belongs to the caller's next pass, not here.
    async fn resolve_public_ips(&self) -> PublicIps;
}

/// IP detector with per-family fallback services.
pub struct IpDetector {
    client: reqwest::Client,
    ipv4_services: Vec<String>,
    ipv6_services: Vec<String>,
}

impl IpDetector {
    /// Create a new IP detector with default services.
    pub fn new() -> Self {
        let defaults = Config::default();
        Self::with_services(defaults.ipv4_services, defaults.ipv6_services)
    }

    /// Create a detector using the lookup services from a configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::with_services(config.ipv4_services.clone(), config.ipv6_services.clone())
    }

    /// Create a new IP detector with custom services.
    pub fn with_services(ipv4_services: Vec<String>, ipv6_services: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            ipv4_services,
            ipv6_services,
        }
    }

    /// Detect the public IPv4 address.
    pub async fn detect_ipv4(&self) -> Result<Ipv4Addr> {
        for service in &self.ipv4_services {
            match self.try_service(service).await {
                Ok(IpAddr::V4(ip)) => {
                    tracing::debug!("Detected IPv4 {} from {}", ip, service);
                    return Ok(ip);
                }
                Ok(ip) => {
                    tracing::warn!("Service {} returned non-IPv4 address {}", service, ip);
                }
                Err(e) => {
                    tracing::warn!("Service {} failed: {}", service, e);
                }
            }
        }

        Err(SyncError::IpDetection(
            "All IPv4 lookup services failed".to_string(),
        ))
    }

    /// Detect the public IPv6 address.
    pub async fn detect_ipv6(&self) -> Result<Ipv6Addr> {
        for service in &self.ipv6_services {
            match self.try_service(service).await {
                Ok(IpAddr::V6(ip)) => {
                    tracing::debug!("Detected IPv6 {} from {}", ip, service);
                    return Ok(ip);
                }
                Ok(ip) => {
                    tracing::warn!("Service {} returned non-IPv6 address {}", service, ip);
                }
                Err(e) => {
                    tracing::warn!("IPv6 service {} failed: {}", service, e);
                }
            }
        }

        Err(SyncError::IpDetection(
            "All IPv6 lookup services failed".to_string(),
        ))
    }

    /// Try a single IP lookup service.
    async fn try_service(&self, url: &str) -> Result<IpAddr> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(SyncError::IpDetection(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let text = response.text().await?;
        let ip_str = text.trim();

        ip_str
            .parse()
            .map_err(|_| SyncError::IpDetection(format!("Invalid IP response: {}", ip_str)))
    }
}

impl Default for IpDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IpResolver for IpDetector {
    async fn resolve_public_ips(&self) -> PublicIps {
        let (ipv4, ipv6) = tokio::join!(self.detect_ipv4(), self.detect_ipv6());

        if let Err(e) = &ipv4 {
            tracing::warn!("IPv4 resolution failed: {}", e);
        }
        if let Err(e) = &ipv6 {
            tracing::warn!("IPv6 resolution failed: {}", e);
        }

        PublicIps {
            ipv4: ipv4.ok(),
            ipv6: ipv6.ok(),
        }
    }
}
