//! Core data types for targets, repositories, indicators and reports.
//!
//! - [`ScanTarget`] - A validated GitHub login to scan
//! - [`RepositoryRef`] - A public repository owned by a target
//! - [`Indicator`] - A named sign of compromise with its evidence
//! - [`Finding`] - The verdict for one repository
//! - [`TargetReport`] - All findings for one target
//! - [`ScanReport`] - Complete, ordered scan results
//!
//! # Example
//!
//! ```
//! use hulud_scan::model::{ScanReport, ScanTarget, TargetReport};
//!
//! let alice = ScanTarget::parse("alice").unwrap();
//! let report = ScanReport::new(vec![TargetReport::clean(alice, Vec::new())]);
//!
//! assert_eq!(report.summary.targets_scanned, 1);
//! assert_eq!(report.summary.compromised, 0);
//! ```

mod indicator;
mod report;
mod repository;
mod target;

pub use indicator::*;
pub use report::*;
pub use repository::*;
pub use target::*;
