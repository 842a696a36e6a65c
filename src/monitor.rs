//! Interval-driven monitoring loop.

use crate::config::Config;
use crate::display;
use crate::notify::Notifier;
use crate::reconciler::{PassSummary, Reconciler};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Drives reconciliation passes on a fixed interval until cancelled.
///
/// The first pass runs immediately. Each following pass is scheduled one
/// interval after the previous pass finished, so a slow pass shifts the
/// schedule instead of producing catch-up bursts. Cancellation is honored
/// between passes only; an in-flight pass always runs to completion.
pub struct Monitor {
    reconciler: Reconciler,
    notifier: Option<Notifier>,
    interval: Duration,
}

impl Monitor {
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            reconciler,
            notifier: None,
            interval,
        }
    }

    /// Forward each pass summary to a webhook notifier.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Run a single pass and report it; the one-shot variant of the loop.
    pub async fn run_once(&self, config: &Config) -> PassSummary {
        self.execute_pass(config).await
    }

    /// Run until the cancellation channel signals, then return to the
    /// caller. The loop never exits the process itself.
    pub async fn run(&self, config: &Config, mut cancel: watch::Receiver<bool>) {
        info!(
            "Monitoring every {} minute(s); first pass starting now",
            self.interval.as_secs() / 60
        );

        self.execute_pass(config).await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if *cancel.borrow() {
                        break;
                    }
                    self.execute_pass(config).await;
                }
                changed = cancel.changed() => {
                    // A dropped sender counts as cancellation.
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Monitoring stopped");
    }

    async fn execute_pass(&self, config: &Config) -> PassSummary {
        let summary = self.reconciler.run_pass(config).await;
        display::print_pass_summary(&summary);

        if let Some(notifier) = &self.notifier {
            notifier.send_summary(&summary).await;
        }

        summary
    }
}
