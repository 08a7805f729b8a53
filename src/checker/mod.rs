//! Indicator detection.
//!
//! [`IndicatorRules`] holds the known-bad data; [`IndicatorEngine`] indexes
//! it and evaluates repositories without touching the network.

mod engine;
pub mod lockfile;
mod rules;

pub use engine::{IndicatorEngine, WORKFLOW_DIR};
pub use rules::{
    CompromiseWindow, ContentSnippet, FileSignature, IndicatorRules, PackageRule,
    RepositoryMarkers, WorkflowPattern, WorkflowRules, ANY_VERSION, RULES_VERSION,
};

use crate::error::ScanError;
use std::path::Path;

/// Loads the rule file at `path`, or the built-in rules when no path is
/// given.
pub fn load_rules(path: Option<&Path>) -> Result<IndicatorRules, ScanError> {
    match path {
        Some(path) => IndicatorRules::load(path),
        None => IndicatorRules::builtin(),
    }
}
