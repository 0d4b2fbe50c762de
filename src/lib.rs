//! CCUsage Agent Library
//!
//! A small telemetry agent that watches Claude Code session logs and reports
//! per-request token usage to a CCUsage collector server.
//!
//! ## Pipeline
//!
//! Each collection cycle runs the same stages in order:
//!
//! - [`file_discovery`] - finds `*.jsonl` session logs and orders them oldest first
//! - [`validator`] - accepts or rejects each JSON line as a usage entry
//! - [`dedup`] - drops repeated `message.id:requestId` pairs within one pass
//! - [`state`] - remembers which records the server has already acknowledged
//! - [`reporter`] - sends new records in sequential batches and commits them
//! - [`scheduler`] - drives cycles once or on an interval, with clean shutdown
//!
//! [`collector`] ties the first four together into a single pass, and
//! [`config`] / [`logging`] provide the ambient setup used by the binary.
//!
//! ## Example
//!
//! ```no_run
//! use ccusage_agent::config::Config;
//! use ccusage_agent::scheduler::Scheduler;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load(None)?;
//! config.validate()?;
//!
//! let mut scheduler = Scheduler::new(&config)?;
//! let shutdown = CancellationToken::new();
//! if let Some(report) = scheduler.run_once(&shutdown).await {
//!     println!("sent {} records", report.outcome.summary().records_sent);
//! }
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod dedup;
pub mod file_discovery;
pub mod logging;
pub mod models;
pub mod reporter;
pub mod scheduler;
pub mod state;
pub mod timestamp_parser;
pub mod validator;

pub use collector::{CollectionPass, CollectionStats, UsageCollector};
pub use config::Config;
pub use reporter::{ReportOutcome, Reporter};
pub use scheduler::{CycleReport, Scheduler};
pub use state::StateStore;
