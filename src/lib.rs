//! Scan GitHub accounts for indicators of the Shai-Hulud npm worm.
//!
//! The engine lists each target's public repositories through a
//! rate-limited GitHub client, fetches the files the worm is known to touch
//! (npm manifests and lockfiles, CI workflows, dropped payloads) and checks
//! them against an [`IndicatorRules`](checker::IndicatorRules) set.
//!
//! - [`github`]: rate-limited HTTP client, pagination and the [`Gateway`](github::Gateway) trait
//! - [`checker`]: indicator rules and the [`IndicatorEngine`](checker::IndicatorEngine)
//! - [`scanner`]: worker pool and orchestrator producing a [`ScanReport`]

pub mod checker;
pub mod config;
pub mod error;
pub mod github;
pub mod model;
pub mod output;
pub mod scanner;

pub use config::Config;
pub use error::ScanError;
pub use model::{
    Finding, FindingStatus, Indicator, IndicatorKind, ScanReport, ScanTarget, TargetReport,
};
pub use scanner::{ScanOrchestrator, TargetSource};
