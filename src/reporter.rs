//! Batch transmission to the CCUsage collector
//!
//! Records go out in batches of [`BATCH_SIZE`], strictly one after another.
//! A batch counts as delivered only when the server answers 2xx with a JSON
//! object body; its record ids are then marked in the [`StateStore`] and the
//! state is saved before the next batch is attempted.
//!
//! The first failed batch ends the run. Nothing after it is sent, so the
//! server never sees batch K+1 ahead of a missing batch K. Unsent records
//! stay unmarked and are collected again on the next cycle.

use crate::models::{ReportPayload, ReportResponse, UsageRecord};
use crate::state::StateStore;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const BATCH_SIZE: usize = 500;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const REPORT_PATH: &str = "/api/usage/report";
pub const AGENT_ID: &str = "ccusage-agent";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("server responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unparseable response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response body is not a JSON object")]
    UnexpectedShape,
}

/// Totals for the batches that were acknowledged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub batches_sent: usize,
    pub records_sent: usize,
    pub inserted: u64,
    pub skipped: u64,
}

#[derive(Debug)]
pub enum ReportOutcome {
    Success(ReportSummary),
    PartialFailure {
        summary: ReportSummary,
        /// Records left unreported, the failed batch included.
        pending: usize,
        error: ReportError,
    },
}

impl ReportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ReportOutcome::Success(_))
    }

    pub fn summary(&self) -> &ReportSummary {
        match self {
            ReportOutcome::Success(summary) | ReportOutcome::PartialFailure { summary, .. } => {
                summary
            }
        }
    }
}

pub struct Reporter {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl Reporter {
    pub fn new(server: &str, api_key: &str, insecure_tls: bool) -> Result<Self, ReportError> {
        if insecure_tls {
            warn!("TLS certificate verification is disabled");
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("{}/{}", AGENT_ID, env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(insecure_tls)
            .build()
            .map_err(ReportError::Client)?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", server.trim_end_matches('/'), REPORT_PATH),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `records` batch by batch, committing each acknowledged batch to
    /// `state`. Stops at the first failure.
    pub async fn report(&self, records: &[UsageRecord], state: &mut StateStore) -> ReportOutcome {
        let mut summary = ReportSummary::default();

        if records.is_empty() {
            info!("No new records to report");
            return ReportOutcome::Success(summary);
        }

        let total_batches = records.len().div_ceil(BATCH_SIZE);

        for (index, batch) in records.chunks(BATCH_SIZE).enumerate() {
            debug!(
                batch = index + 1,
                total_batches,
                records = batch.len(),
                "Sending usage batch"
            );

            let response = match self.send_batch(batch).await {
                Ok(response) => response,
                Err(error) => {
                    let pending = records.len() - summary.records_sent;
                    error!(
                        batch = index + 1,
                        total_batches,
                        pending,
                        %error,
                        "Failed to report usage batch, remaining batches deferred to next cycle"
                    );
                    return ReportOutcome::PartialFailure {
                        summary,
                        pending,
                        error,
                    };
                }
            };

            for record in batch {
                state.mark_reported(&record.record_id);
            }
            if let Err(error) = state.save() {
                error!(%error, "Error saving state after batch");
            }

            let inserted = response.inserted.unwrap_or(batch.len() as u64);
            let skipped = response.skipped.unwrap_or(0);
            summary.batches_sent += 1;
            summary.records_sent += batch.len();
            summary.inserted += inserted;
            summary.skipped += skipped;

            info!(
                batch = index + 1,
                total_batches,
                inserted,
                skipped,
                "Reported usage batch"
            );
        }

        ReportOutcome::Success(summary)
    }

    async fn send_batch(&self, batch: &[UsageRecord]) -> Result<ReportResponse, ReportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ReportPayload { records: batch })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ReportError::Status {
                status,
                body: body.trim().to_string(),
            });
        }

        let value: Value = serde_json::from_str(&body)?;
        let object = value.as_object().ok_or(ReportError::UnexpectedShape)?;
        Ok(ReportResponse::from_object(object))
    }
}
