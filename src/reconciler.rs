//! Record and access-policy reconciliation.
//!
//! A pass resolves the public IPs once, then walks the configured zones and
//! policies comparing desired against observed state. Remote state is
//! fetched fresh every pass and discarded with the pass's outcomes; the
//! provider remains the only source of truth between passes.

use crate::config::{Config, PolicyConfig, ZoneConfig};
use crate::detector::{IpResolver, PublicIps};
use crate::provider::{AccessPolicy, DnsRecord, ProviderApi, RecordType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Outcome of reconciling one DNS record. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub zone_name: String,
    pub record_name: String,
    pub record_type: RecordType,
    /// Content observed before the pass acted on the record.
    pub old_ip: Option<String>,
    /// Content after the pass; equals `old_ip` when nothing changed.
    pub new_ip: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of reconciling one access policy. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyOutcome {
    pub app_name: String,
    pub policy_name: String,
    pub old_ip: Option<String>,
    pub new_ip: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RecordOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.success && self.old_ip == self.new_ip
    }

    pub fn is_updated(&self) -> bool {
        self.success && self.old_ip != self.new_ip
    }
}

impl PolicyOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.success && self.old_ip == self.new_ip
    }

    pub fn is_updated(&self) -> bool {
        self.success && self.old_ip != self.new_ip
    }
}

/// Full result set of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub records: Vec<RecordOutcome>,
    pub policies: Vec<PolicyOutcome>,
    pub completed_at: DateTime<Utc>,
}

impl PassSummary {
    pub fn updated(&self) -> usize {
        self.records.iter().filter(|r| r.is_updated()).count()
            + self.policies.iter().filter(|p| p.is_updated()).count()
    }

    pub fn unchanged(&self) -> usize {
        self.records.iter().filter(|r| r.is_unchanged()).count()
            + self.policies.iter().filter(|p| p.is_unchanged()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.iter().filter(|r| !r.success).count()
            + self.policies.iter().filter(|p| !p.success).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Compares desired against observed state and applies necessary updates.
pub struct Reconciler {
    resolver: Box<dyn IpResolver>,
    provider: Box<dyn ProviderApi>,
}

impl Reconciler {
    pub fn new(resolver: Box<dyn IpResolver>, provider: Box<dyn ProviderApi>) -> Self {
        Self { resolver, provider }
    }

    /// Run one full pass: resolve IPs once, reconcile records, then policies.
    pub async fn run_pass(&self, config: &Config) -> PassSummary {
        let ips = self.resolver.resolve_public_ips().await;
        debug!("Resolved public IPs: ipv4={:?} ipv6={:?}", ips.ipv4, ips.ipv6);

        let records = self.reconcile_records(config, &ips).await;
        let policies = self.reconcile_policies(config, &ips).await;

        PassSummary {
            records,
            policies,
            completed_at: Utc::now(),
        }
    }

    /// Reconcile every configured record, zone by zone in configuration
    /// order. A zone whose listing fails is logged and skipped; its records
    /// produce no outcomes for this pass.
    pub async fn reconcile_records(
        &self,
        config: &Config,
        ips: &PublicIps,
    ) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::new();

        for zone in &config.zones {
            let (a_records, aaaa_records) = tokio::join!(
                self.provider.list_records(&zone.zone_id, RecordType::A),
                self.provider.list_records(&zone.zone_id, RecordType::AAAA),
            );

            let fetched = match (a_records, aaaa_records) {
                (Ok(mut a), Ok(aaaa)) => {
                    a.extend(aaaa);
                    a
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(
                        "Skipping zone {}: failed to list records: {}",
                        zone.zone_name, e
                    );
                    continue;
                }
            };

            // List-then-filter: everything is fetched, but only records in
            // the configured id set are ever acted upon.
            let selected: HashSet<&str> = zone.record_ids.iter().map(String::as_str).collect();
            for record in fetched
                .into_iter()
                .filter(|r| selected.contains(r.id.as_str()))
            {
                outcomes.push(self.reconcile_record(zone, record, ips).await);
            }
        }

        outcomes
    }

    async fn reconcile_record(
        &self,
        zone: &ZoneConfig,
        record: DnsRecord,
        ips: &PublicIps,
    ) -> RecordOutcome {
        let candidate = match record.record_type {
            RecordType::A => ips.ipv4.map(|ip| ip.to_string()),
            RecordType::AAAA => ips.ipv6.map(|ip| ip.to_string()),
        };

        let Some(candidate) = candidate else {
            return RecordOutcome {
                zone_name: zone.zone_name.clone(),
                record_name: record.name,
                record_type: record.record_type,
                old_ip: Some(record.content),
                new_ip: None,
                success: false,
                error: Some(format!(
                    "no {} address available",
                    record.record_type.family_name()
                )),
                timestamp: Utc::now(),
            };
        };

        if candidate == record.content {
            return RecordOutcome {
                zone_name: zone.zone_name.clone(),
                record_name: record.name,
                record_type: record.record_type,
                old_ip: Some(record.content.clone()),
                new_ip: Some(record.content),
                success: true,
                error: None,
                timestamp: Utc::now(),
            };
        }

        // Name, proxied flag, and TTL are preserved as observed.
        let updated = DnsRecord {
            content: candidate.clone(),
            ..record.clone()
        };

        match self.provider.update_record(&zone.zone_id, &updated).await {
            Ok(()) => RecordOutcome {
                zone_name: zone.zone_name.clone(),
                record_name: record.name,
                record_type: record.record_type,
                old_ip: Some(record.content),
                new_ip: Some(candidate),
                success: true,
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => RecordOutcome {
                zone_name: zone.zone_name.clone(),
                record_name: record.name,
                record_type: record.record_type,
                old_ip: Some(record.content),
                new_ip: Some(candidate),
                success: false,
                error: Some(e.to_string()),
                timestamp: Utc::now(),
            },
        }
    }

    /// Reconcile configured access policies against the resolved IPv4
    /// address. A silent no-op unless an account ID and at least one policy
    /// are configured; a skip (with warning) when IPv4 is unresolved.
    pub async fn reconcile_policies(
        &self,
        config: &Config,
        ips: &PublicIps,
    ) -> Vec<PolicyOutcome> {
        let Some(account_id) = config.account_id.as_deref() else {
            return Vec::new();
        };
        if config.policies.is_empty() {
            return Vec::new();
        }

        let Some(ipv4) = ips.ipv4 else {
            warn!("No IPv4 address available; skipping policy synchronization this pass");
            return Vec::new();
        };
        let candidate = ipv4.to_string();

        // One listing per distinct application per pass; a failed listing is
        // remembered so the app is not re-fetched for its other policies.
        let mut listings: HashMap<&str, Option<Vec<AccessPolicy>>> = HashMap::new();
        let mut outcomes = Vec::new();

        for policy_config in &config.policies {
            if let Entry::Vacant(entry) = listings.entry(policy_config.app_id.as_str()) {
                let fetched = match self
                    .provider
                    .list_policies(account_id, &policy_config.app_id)
                    .await
                {
                    Ok(policies) => Some(policies),
                    Err(e) => {
                        warn!(
                            "Skipping app {}: failed to list policies: {}",
                            policy_config.app_name, e
                        );
                        None
                    }
                };
                entry.insert(fetched);
            }

            let Some(Some(policies)) = listings.get(policy_config.app_id.as_str()) else {
                continue;
            };

            outcomes.push(
                self.reconcile_policy(account_id, policy_config, policies, &candidate)
                    .await,
            );
        }

        outcomes
    }

    async fn reconcile_policy(
        &self,
        account_id: &str,
        policy_config: &PolicyConfig,
        policies: &[AccessPolicy],
        candidate: &str,
    ) -> PolicyOutcome {
        let Some(policy) = policies.iter().find(|p| p.id == policy_config.policy_id) else {
            return PolicyOutcome {
                app_name: policy_config.app_name.clone(),
                policy_name: policy_config.policy_name.clone(),
                old_ip: None,
                new_ip: Some(candidate.to_string()),
                success: false,
                error: Some("policy not found".to_string()),
                timestamp: Utc::now(),
            };
        };

        // Listings are pre-filtered to IP-bearing policies, so this only
        // trips if the provider contradicts its own listing contract.
        let Some(current) = policy.include_ip() else {
            return PolicyOutcome {
                app_name: policy_config.app_name.clone(),
                policy_name: policy_config.policy_name.clone(),
                old_ip: None,
                new_ip: Some(candidate.to_string()),
                success: false,
                error: Some("policy has no IP rule".to_string()),
                timestamp: Utc::now(),
            };
        };

        if strip_cidr(current) == strip_cidr(candidate) {
            return PolicyOutcome {
                app_name: policy_config.app_name.clone(),
                policy_name: policy_config.policy_name.clone(),
                old_ip: Some(current.to_string()),
                new_ip: Some(current.to_string()),
                success: true,
                error: None,
                timestamp: Utc::now(),
            };
        }

        // A CIDR suffix on the observed value is carried over to the new one.
        let new_value = match cidr_suffix(current) {
            Some(suffix) => format!("{}/{}", strip_cidr(candidate), suffix),
            None => candidate.to_string(),
        };

        let updated = policy.with_include_ip(&new_value);
        let old_ip = current.to_string();

        match self
            .provider
            .update_policy(account_id, &policy_config.app_id, &updated)
            .await
        {
            Ok(()) => PolicyOutcome {
                app_name: policy_config.app_name.clone(),
                policy_name: policy_config.policy_name.clone(),
                old_ip: Some(old_ip),
                new_ip: Some(new_value),
                success: true,
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => PolicyOutcome {
                app_name: policy_config.app_name.clone(),
                policy_name: policy_config.policy_name.clone(),
                old_ip: Some(old_ip),
                new_ip: Some(new_value),
                success: false,
                error: Some(e.to_string()),
                timestamp: Utc::now(),
            },
        }
    }
}

/// Strip an optional CIDR suffix for equality comparison.
pub(crate) fn strip_cidr(value: &str) -> &str {
    value.split_once('/').map_or(value, |(ip, _)| ip)
}

/// The CIDR suffix of a value, if present.
fn cidr_suffix(value: &str) -> Option<&str> {
    value.split_once('/').map(|(_, suffix)| suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PolicyConfig, ZoneConfig};
    use crate::detector::MockIpResolver;
    use crate::error::SyncError;
    use crate::provider::{AccessRule, PolicyDecision};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticResolver(PublicIps);

    #[async_trait]
    impl IpResolver for StaticResolver {
        async fn resolve_public_ips(&self) -> PublicIps {
            self.0
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        zones: HashMap<String, Vec<DnsRecord>>,
        apps: HashMap<String, Vec<AccessPolicy>>,
        fail_record_ids: HashSet<String>,
        record_updates: Mutex<Vec<(String, DnsRecord)>>,
        policy_updates: Mutex<Vec<(String, String, AccessPolicy)>>,
        list_record_calls: AtomicUsize,
        list_policy_calls: AtomicUsize,
    }

    impl FakeProvider {
        fn with_zone(mut self, zone_id: &str, records: Vec<DnsRecord>) -> Self {
            self.zones.insert(zone_id.to_string(), records);
            self
        }

        fn with_app(mut self, app_id: &str, policies: Vec<AccessPolicy>) -> Self {
            self.apps.insert(app_id.to_string(), policies);
            self
        }

        fn failing_record(mut self, record_id: &str) -> Self {
            self.fail_record_ids.insert(record_id.to_string());
            self
        }

        fn record_updates(&self) -> Vec<(String, DnsRecord)> {
            self.record_updates.lock().unwrap().clone()
        }

        fn policy_updates(&self) -> Vec<(String, String, AccessPolicy)> {
            self.policy_updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderApi for FakeProvider {
        async fn list_records(
            &self,
            zone_id: &str,
            record_type: RecordType,
        ) -> crate::error::Result<Vec<DnsRecord>> {
            self.list_record_calls.fetch_add(1, Ordering::SeqCst);
            let records = self
                .zones
                .get(zone_id)
                .ok_or_else(|| SyncError::provider(zone_id, "zone not found"))?;
            Ok(records
                .iter()
                .filter(|r| r.record_type == record_type)
                .cloned()
                .collect())
        }

        async fn update_record(
            &self,
            zone_id: &str,
            record: &DnsRecord,
        ) -> crate::error::Result<()> {
            if self.fail_record_ids.contains(&record.id) {
                return Err(SyncError::provider(&record.name, "update rejected"));
            }
            self.record_updates
                .lock()
                .unwrap()
                .push((zone_id.to_string(), record.clone()));
            Ok(())
        }

        async fn list_policies(
            &self,
            _account_id: &str,
            app_id: &str,
        ) -> crate::error::Result<Vec<AccessPolicy>> {
            self.list_policy_calls.fetch_add(1, Ordering::SeqCst);
            let policies = self
                .apps
                .get(app_id)
                .ok_or_else(|| SyncError::provider(app_id, "app not found"))?;
            Ok(policies.clone())
        }

        async fn update_policy(
            &self,
            account_id: &str,
            app_id: &str,
            policy: &AccessPolicy,
        ) -> crate::error::Result<()> {
            self.policy_updates.lock().unwrap().push((
                account_id.to_string(),
                app_id.to_string(),
                policy.clone(),
            ));
            Ok(())
        }

        async fn verify_token(&self) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn a_record(id: &str, name: &str, content: &str) -> DnsRecord {
        DnsRecord {
            id: id.to_string(),
            record_type: RecordType::A,
            name: name.to_string(),
            content: content.to_string(),
            proxied: false,
            ttl: 1,
        }
    }

    fn aaaa_record(id: &str, name: &str, content: &str) -> DnsRecord {
        DnsRecord {
            record_type: RecordType::AAAA,
            ..a_record(id, name, content)
        }
    }

    fn ip_policy(id: &str, name: &str, ip: &str, reusable: bool) -> AccessPolicy {
        AccessPolicy {
            id: id.to_string(),
            name: name.to_string(),
            decision: PolicyDecision::Allow,
            include: vec![AccessRule::Ip { ip: ip.to_string() }],
            exclude: vec![],
            require: vec![],
            reusable,
        }
    }

    fn zone_config(zone_id: &str, record_ids: &[&str]) -> ZoneConfig {
        ZoneConfig {
            zone_id: zone_id.to_string(),
            zone_name: "example.com".to_string(),
            record_ids: record_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn policy_config(app_id: &str, policy_id: &str) -> PolicyConfig {
        PolicyConfig {
            app_id: app_id.to_string(),
            app_name: "Home Lab".to_string(),
            policy_id: policy_id.to_string(),
            policy_name: "Allow home IP".to_string(),
        }
    }

    fn test_config(zones: Vec<ZoneConfig>, policies: Vec<PolicyConfig>) -> Config {
        Config {
            api_token: "token".to_string(),
            account_id: Some("acct-1".to_string()),
            zones,
            policies,
            ..Config::default()
        }
    }

    fn v4(ip: &str) -> PublicIps {
        PublicIps {
            ipv4: Some(ip.parse().unwrap()),
            ipv6: None,
        }
    }

    fn reconciler(ips: PublicIps, provider: FakeProvider) -> (Reconciler, std::sync::Arc<FakeProvider>) {
        let provider = std::sync::Arc::new(provider);
        let rec = Reconciler::new(
            Box::new(StaticResolver(ips)),
            Box::new(ArcProvider(provider.clone())),
        );
        (rec, provider)
    }

    struct ArcProvider(std::sync::Arc<FakeProvider>);

    #[async_trait]
    impl ProviderApi for ArcProvider {
        async fn list_records(
            &self,
            zone_id: &str,
            record_type: RecordType,
        ) -> crate::error::Result<Vec<DnsRecord>> {
            self.0.list_records(zone_id, record_type).await
        }

        async fn update_record(
            &self,
            zone_id: &str,
            record: &DnsRecord,
        ) -> crate::error::Result<()> {
            self.0.update_record(zone_id, record).await
        }

        async fn list_policies(
            &self,
            account_id: &str,
            app_id: &str,
        ) -> crate::error::Result<Vec<AccessPolicy>> {
            self.0.list_policies(account_id, app_id).await
        }

        async fn update_policy(
            &self,
            account_id: &str,
            app_id: &str,
            policy: &AccessPolicy,
        ) -> crate::error::Result<()> {
            self.0.update_policy(account_id, app_id, policy).await
        }

        async fn verify_token(&self) -> crate::error::Result<()> {
            self.0.verify_token().await
        }
    }

    #[test]
    fn test_strip_cidr() {
        assert_eq!(strip_cidr("1.2.3.4/32"), "1.2.3.4");
        assert_eq!(strip_cidr("1.2.3.4"), "1.2.3.4");
        assert_eq!(cidr_suffix("1.2.3.4/32"), Some("32"));
        assert_eq!(cidr_suffix("1.2.3.4"), None);
    }

    #[tokio::test]
    async fn test_matching_record_is_unchanged_without_update_call() {
        let provider =
            FakeProvider::default().with_zone("z1", vec![a_record("r1", "vpn.example.com", "2.2.2.2")]);
        let config = test_config(vec![zone_config("z1", &["r1"])], vec![]);
        let (rec, provider) = reconciler(v4("2.2.2.2"), provider);

        let outcomes = rec
            .reconcile_records(&config, &v4("2.2.2.2"))
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_unchanged());
        assert_eq!(outcomes[0].old_ip.as_deref(), Some("2.2.2.2"));
        assert_eq!(outcomes[0].new_ip.as_deref(), Some("2.2.2.2"));
        assert!(provider.record_updates().is_empty());
    }

    #[tokio::test]
    async fn test_family_isolation() {
        let provider = FakeProvider::default().with_zone(
            "z1",
            vec![
                a_record("r1", "vpn.example.com", "1.1.1.1"),
                aaaa_record("r2", "vpn.example.com", "::1"),
            ],
        );
        let config = test_config(vec![zone_config("z1", &["r1", "r2"])], vec![]);
        let ips = v4("2.2.2.2");
        let (rec, provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_records(&config, &ips).await;

        assert_eq!(outcomes.len(), 2);
        let a = outcomes
            .iter()
            .find(|o| o.record_type == RecordType::A)
            .unwrap();
        let aaaa = outcomes
            .iter()
            .find(|o| o.record_type == RecordType::AAAA)
            .unwrap();

        assert!(a.is_updated());
        assert_eq!(a.new_ip.as_deref(), Some("2.2.2.2"));
        assert!(!aaaa.success);
        assert_eq!(aaaa.error.as_deref(), Some("no IPv6 address available"));
        assert_eq!(aaaa.new_ip, None);
        assert_eq!(provider.record_updates().len(), 1);
    }

    #[tokio::test]
    async fn test_update_preserves_name_proxied_ttl() {
        let mut record = a_record("r1", "web.example.com", "1.1.1.1");
        record.proxied = true;
        record.ttl = 300;
        let provider = FakeProvider::default().with_zone("z1", vec![record]);
        let config = test_config(vec![zone_config("z1", &["r1"])], vec![]);
        let ips = v4("2.2.2.2");
        let (rec, provider) = reconciler(ips, provider);

        rec.reconcile_records(&config, &ips).await;

        let updates = provider.record_updates();
        assert_eq!(updates.len(), 1);
        let (zone_id, updated) = &updates[0];
        assert_eq!(zone_id, "z1");
        assert_eq!(updated.name, "web.example.com");
        assert_eq!(updated.content, "2.2.2.2");
        assert!(updated.proxied);
        assert_eq!(updated.ttl, 300);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let provider = FakeProvider::default()
            .with_zone(
                "z1",
                vec![
                    a_record("r1", "one.example.com", "9.9.9.9"),
                    a_record("r2", "two.example.com", "9.9.9.9"),
                ],
            )
            .failing_record("r1");
        let config = test_config(vec![zone_config("z1", &["r1", "r2"])], vec![]);
        let ips = v4("2.2.2.2");
        let (rec, _provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_records(&config, &ips).await;

        assert_eq!(outcomes.len(), 2);
        let failed = outcomes.iter().find(|o| !o.success).unwrap();
        let succeeded = outcomes.iter().find(|o| o.success).unwrap();

        assert_eq!(failed.record_name, "one.example.com");
        // Diagnostic values are populated even on failure.
        assert_eq!(failed.old_ip.as_deref(), Some("9.9.9.9"));
        assert_eq!(failed.new_ip.as_deref(), Some("2.2.2.2"));
        assert!(failed.error.as_deref().unwrap().contains("update rejected"));
        assert!(succeeded.is_updated());
    }

    #[tokio::test]
    async fn test_unselected_records_are_never_acted_upon() {
        let provider = FakeProvider::default().with_zone(
            "z1",
            vec![
                a_record("r1", "one.example.com", "1.1.1.1"),
                a_record("r2", "two.example.com", "1.1.1.1"),
                a_record("r3", "three.example.com", "1.1.1.1"),
            ],
        );
        let config = test_config(vec![zone_config("z1", &["r2"])], vec![]);
        let ips = v4("2.2.2.2");
        let (rec, provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_records(&config, &ips).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].record_name, "two.example.com");
        assert_eq!(provider.record_updates().len(), 1);
    }

    #[tokio::test]
    async fn test_zone_listing_failure_skips_only_that_zone() {
        let provider =
            FakeProvider::default().with_zone("z2", vec![a_record("r2", "ok.example.com", "1.1.1.1")]);
        let config = test_config(
            vec![zone_config("z-missing", &["r1"]), zone_config("z2", &["r2"])],
            vec![],
        );
        let ips = v4("2.2.2.2");
        let (rec, _provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_records(&config, &ips).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].record_name, "ok.example.com");
        assert!(outcomes[0].is_updated());
    }

    #[tokio::test]
    async fn test_end_to_end_pass() {
        let provider = FakeProvider::default().with_zone(
            "z1",
            vec![
                a_record("r1", "one.example.com", "1.1.1.1"),
                a_record("r2", "two.example.com", "2.2.2.2"),
            ],
        );
        let config = test_config(vec![zone_config("z1", &["r1", "r2"])], vec![]);
        let (rec, provider) = reconciler(v4("2.2.2.2"), provider);

        let summary = rec.run_pass(&config).await;

        assert_eq!(summary.updated(), 1);
        assert_eq!(summary.unchanged(), 1);
        assert_eq!(summary.failed(), 0);
        let updated = summary.records.iter().find(|o| o.is_updated()).unwrap();
        assert_eq!(updated.old_ip.as_deref(), Some("1.1.1.1"));
        assert_eq!(updated.new_ip.as_deref(), Some("2.2.2.2"));
        assert_eq!(provider.record_updates().len(), 1);
    }

    #[tokio::test]
    async fn test_ips_resolved_once_per_pass() {
        let mut resolver = MockIpResolver::new();
        resolver
            .expect_resolve_public_ips()
            .times(1)
            .returning(|| v4("2.2.2.2"));

        let provider = FakeProvider::default()
            .with_zone("z1", vec![a_record("r1", "one.example.com", "2.2.2.2")])
            .with_zone("z2", vec![a_record("r2", "two.example.com", "2.2.2.2")]);
        let mut config = test_config(
            vec![zone_config("z1", &["r1"]), zone_config("z2", &["r2"])],
            vec![],
        );
        config.zones[1].zone_name = "other.com".to_string();

        let rec = Reconciler::new(Box::new(resolver), Box::new(provider));
        let summary = rec.run_pass(&config).await;

        assert_eq!(summary.unchanged(), 2);
    }

    #[tokio::test]
    async fn test_no_account_id_is_silent_noop() {
        let provider = FakeProvider::default().with_app(
            "app-1",
            vec![ip_policy("p1", "Allow home IP", "1.2.3.4", false)],
        );
        let mut config = test_config(vec![], vec![policy_config("app-1", "p1")]);
        config.account_id = None;
        let ips = v4("2.2.2.2");
        let (rec, provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_policies(&config, &ips).await;

        assert!(outcomes.is_empty());
        assert_eq!(provider.list_policy_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_ipv4_skips_policies_without_network_calls() {
        let provider = FakeProvider::default().with_app(
            "app-1",
            vec![ip_policy("p1", "Allow home IP", "1.2.3.4", false)],
        );
        let config = test_config(vec![], vec![policy_config("app-1", "p1")]);
        let ips = PublicIps {
            ipv4: None,
            ipv6: Some("::1".parse().unwrap()),
        };
        let (rec, provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_policies(&config, &ips).await;

        assert!(outcomes.is_empty());
        assert_eq!(provider.list_policy_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cidr_suffix_preserved_on_policy_update() {
        let provider = FakeProvider::default().with_app(
            "app-1",
            vec![ip_policy("p1", "Allow home IP", "10.0.0.1/32", true)],
        );
        let config = test_config(vec![], vec![policy_config("app-1", "p1")]);
        let ips = v4("10.0.0.2");
        let (rec, provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_policies(&config, &ips).await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_updated());
        assert_eq!(outcomes[0].old_ip.as_deref(), Some("10.0.0.1/32"));
        assert_eq!(outcomes[0].new_ip.as_deref(), Some("10.0.0.2/32"));

        let updates = provider.policy_updates();
        assert_eq!(updates.len(), 1);
        let (account_id, app_id, submitted) = &updates[0];
        assert_eq!(account_id, "acct-1");
        assert_eq!(app_id, "app-1");
        assert_eq!(submitted.include_ip(), Some("10.0.0.2/32"));
        assert!(submitted.reusable);
    }

    #[tokio::test]
    async fn test_policy_unchanged_after_cidr_normalization() {
        let provider = FakeProvider::default().with_app(
            "app-1",
            vec![ip_policy("p1", "Allow home IP", "10.0.0.2/32", false)],
        );
        let config = test_config(vec![], vec![policy_config("app-1", "p1")]);
        let ips = v4("10.0.0.2");
        let (rec, provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_policies(&config, &ips).await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_unchanged());
        assert!(provider.policy_updates().is_empty());
    }

    #[tokio::test]
    async fn test_non_ip_rules_pass_through_on_rewrite() {
        let mut policy = ip_policy("p1", "Allow home IP", "1.1.1.1", false);
        policy
            .include
            .push(AccessRule::IpList { id: "list-1".to_string() });
        policy.include.push(AccessRule::Ip { ip: "1.1.1.1".to_string() });
        let provider = FakeProvider::default().with_app("app-1", vec![policy]);
        let config = test_config(vec![], vec![policy_config("app-1", "p1")]);
        let ips = v4("2.2.2.2");
        let (rec, provider) = reconciler(ips, provider);

        rec.reconcile_policies(&config, &ips).await;

        let updates = provider.policy_updates();
        assert_eq!(updates.len(), 1);
        let submitted = &updates[0].2;
        assert_eq!(
            submitted.include,
            vec![
                AccessRule::Ip { ip: "2.2.2.2".to_string() },
                AccessRule::IpList { id: "list-1".to_string() },
                AccessRule::Ip { ip: "2.2.2.2".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn test_policy_not_found() {
        let provider = FakeProvider::default().with_app("app-1", vec![]);
        let config = test_config(vec![], vec![policy_config("app-1", "p-missing")]);
        let ips = v4("2.2.2.2");
        let (rec, _provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_policies(&config, &ips).await;

        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
        assert_eq!(outcomes[0].error.as_deref(), Some("policy not found"));
    }

    #[tokio::test]
    async fn test_one_listing_per_app() {
        let provider = FakeProvider::default().with_app(
            "app-1",
            vec![
                ip_policy("p1", "One", "1.1.1.1", false),
                ip_policy("p2", "Two", "1.1.1.1", false),
            ],
        );
        let config = test_config(
            vec![],
            vec![policy_config("app-1", "p1"), policy_config("app-1", "p2")],
        );
        let ips = v4("1.1.1.1");
        let (rec, provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_policies(&config, &ips).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(provider.list_policy_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_app_listing_failure_skips_only_that_app() {
        let provider = FakeProvider::default().with_app(
            "app-2",
            vec![ip_policy("p2", "Two", "1.1.1.1", false)],
        );
        let config = test_config(
            vec![],
            vec![
                policy_config("app-missing", "p1"),
                policy_config("app-2", "p2"),
            ],
        );
        let ips = v4("1.1.1.1");
        let (rec, provider) = reconciler(ips, provider);

        let outcomes = rec.reconcile_policies(&config, &ips).await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_unchanged());
        // The failed app is remembered, not retried per policy.
        assert_eq!(provider.list_policy_calls.load(Ordering::SeqCst), 2);
    }
}
