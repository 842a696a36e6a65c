//! # zonesync
//!
//! A dynamic-DNS reconciler for Cloudflare zones. It detects the caller's
//! current public IPv4/IPv6 addresses and keeps a configured set of DNS
//! records — and optionally zero-trust access-policy IP allow-lists —
//! pointed at them.
//!
//! ## Features
//!
//! - Independent IPv4/IPv6 detection with fallback lookup services
//! - Per-record reconciliation: update only on mismatch, preserve
//!   name/proxied/TTL
//! - Access-policy allow-list synchronization with CIDR-suffix preservation
//! - Interval monitoring loop with cooperative cancellation
//! - Webhook notifications of per-pass summaries
//!
//! ## Usage
//!
//! ```bash
//! # Show current IPs and record state
//! zonesync status
//!
//! # Run one reconciliation pass
//! zonesync update
//!
//! # Reconcile every 5 minutes until stopped
//! zonesync monitor
//! ```

pub mod config;
pub mod detector;
pub mod display;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod provider;
pub mod reconciler;

pub use config::Config;
pub use detector::{IpDetector, PublicIps};
pub use error::{Result, SyncError};
pub use reconciler::{PassSummary, Reconciler};
