use super::reconciler::{Reconciler, SweepKind, SweepReport};
use crate::domain::ports::SettingsProvider;
use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

/// Runs the reconciliation sweeps on a fixed cadence.
///
/// Settings are read at the start of every cycle so rotated credentials apply to the
/// next run. Within a cycle, recovery runs first so that payments it discovers are
/// captured in the same cycle.
pub struct SweepScheduler {
    reconciler: Arc<Reconciler>,
    settings: Arc<dyn SettingsProvider>,
    period: Duration,
}

impl SweepScheduler {
    pub fn new(
        reconciler: Arc<Reconciler>,
        settings: Arc<dyn SettingsProvider>,
        period: Duration,
    ) -> Self {
        Self {
            reconciler,
            settings,
            period,
        }
    }

    /// One recover → authorize → capture pass. A failed sweep does not stop the others.
    pub async fn run_cycle(&self) -> Result<Vec<SweepReport>> {
        let settings = self.settings.gateway_settings()?;
        let credentials = &settings.credentials;
        let mut reports = Vec::with_capacity(3);

        for kind in [SweepKind::Recover, SweepKind::Authorize, SweepKind::Capture] {
            let result = match kind {
                SweepKind::Recover => self.reconciler.recover_missing(credentials).await,
                SweepKind::Authorize => self.reconciler.authorize_batch(credentials).await,
                SweepKind::Capture => {
                    self.reconciler
                        .capture(None, credentials, false, None)
                        .await
                }
            };
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!(sweep = %kind, error = %e, "sweep aborted"),
            }
        }

        Ok(reports)
    }

    /// Runs cycles until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(period_secs = self.period.as_secs(), "sweep scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("sweep scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "sweep cycle skipped");
                    }
                }
            }
        }
    }
}
