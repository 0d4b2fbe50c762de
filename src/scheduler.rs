//! Collection cycle driver
//!
//! A cycle is: scan and collect, report, then persist state. Cycles never
//! overlap. In continuous mode the next cycle starts one interval after the
//! previous one finished. Cancellation is observed while a cycle is running
//! and while sleeping; state is flushed before returning either way.

use crate::collector::{CollectionStats, UsageCollector};
use crate::config::Config;
use crate::reporter::{ReportOutcome, Reporter};
use crate::state::StateStore;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// What one cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub stats: CollectionStats,
    pub outcome: ReportOutcome,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

pub struct Scheduler {
    collector: UsageCollector,
    reporter: Reporter,
    state: StateStore,
    interval: Duration,
}

impl Scheduler {
    /// Build the pipeline from validated configuration and load state.
    pub fn new(config: &Config) -> Result<Self> {
        let reporter = Reporter::new(&config.server, &config.api_key, config.insecure_tls)
            .context("Failed to initialise reporter")?;

        Ok(Self::from_parts(
            UsageCollector::new(&config.projects_dir),
            reporter,
            StateStore::load(&config.state_file),
            config.report_interval.as_duration(),
        ))
    }

    pub fn from_parts(
        collector: UsageCollector,
        reporter: Reporter,
        state: StateStore,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            reporter,
            state,
            interval,
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single cycle to completion.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let span = info_span!("cycle", cycle_id = %Uuid::new_v4());
        self.cycle().instrument(span).await
    }

    async fn cycle(&mut self) -> CycleReport {
        info!(projects_dir = %self.collector.projects_dir().display(), "Collecting usage data");

        let pass = self.collector.collect(&self.state);
        info!(
            files = pass.stats.files,
            lines = pass.stats.lines,
            accepted = pass.stats.accepted,
            rejected = pass.stats.rejected,
            duplicates = pass.stats.duplicates,
            unique_hashes = pass.stats.unique_hashes,
            already_reported = pass.stats.already_reported,
            new_records = pass.stats.new_records,
            "Collection pass complete"
        );

        let outcome = self.reporter.report(&pass.records, &mut self.state).await;
        self.flush_state();

        CycleReport {
            stats: pass.stats,
            outcome,
        }
    }

    /// One cycle, abandoned if `shutdown` fires first. Returns `None` when
    /// interrupted.
    pub async fn run_once(&mut self, shutdown: &CancellationToken) -> Option<CycleReport> {
        let report = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            report = self.run_cycle() => Some(report),
        };

        if report.is_none() {
            info!("Shutdown requested during cycle");
            self.flush_state();
        }
        report
    }

    /// Cycle until `shutdown` fires. `on_cycle` sees every completed cycle.
    pub async fn run_forever<F>(&mut self, shutdown: &CancellationToken, mut on_cycle: F)
    where
        F: FnMut(&CycleReport),
    {
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                report = self.run_cycle() => on_cycle(&report),
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Shutting down, saving state");
        self.flush_state();
    }

    fn flush_state(&self) {
        if let Err(e) = self.state.save() {
            error!(error = %e, "Error saving state");
        }
    }
}
