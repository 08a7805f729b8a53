//! Scan scheduling.
//!
//! | Type | Role |
//! |------|------|
//! | [`ScanOrchestrator`] | resolves targets, builds the [`ScanReport`](crate::model::ScanReport) |
//! | [`ScanWorkerPool`] | fixed number of workers scanning targets concurrently |
//!
//! # Example
//!
//! ```no_run
//! use hulud_scan::checker::{load_rules, IndicatorEngine};
//! use hulud_scan::github::{
//!     ClientOptions, GitHubApi, RateLimitHandle, RateLimitedClient, WatchList,
//! };
//! use hulud_scan::scanner::{ScanOptions, ScanOrchestrator, TargetSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let rules = load_rules(None)?;
//!     let client = RateLimitedClient::new(ClientOptions::default(), RateLimitHandle::new())?;
//!     let gateway = Arc::new(GitHubApi::new(client, WatchList::from_rules(&rules)));
//!     let engine = Arc::new(IndicatorEngine::new(&rules));
//!
//!     let orchestrator = ScanOrchestrator::new(gateway, engine, ScanOptions::default())?;
//!     let report = orchestrator
//!         .run(&TargetSource::Users(vec!["octocat".to_string()]))
//!         .await?;
//!     println!("{} compromised", report.summary.compromised);
//!     Ok(())
//! }
//! ```

mod orchestrator;
mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{ResolvedTargets, ScanOptions, ScanOrchestrator, TargetSource};
pub use pool::{PoolOutcome, ProgressFn, ScanWorkerPool, DEFAULT_WORKERS};
