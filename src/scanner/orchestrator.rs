use super::pool::{ProgressFn, ScanWorkerPool, DEFAULT_WORKERS};
use crate::checker::IndicatorEngine;
use crate::config::IgnoreConfig;
use crate::error::{Result, ScanError};
use crate::github::Gateway;
use crate::model::{ScanReport, ScanTarget};
use futures::TryStreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the logins to scan come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    /// A literal list, e.g. read from a file.
    Users(Vec<String>),
    /// Every member of an organization.
    Organization(String),
}

#[derive(Clone)]
pub struct ScanOptions {
    pub workers: usize,
    pub ignore: IgnoreConfig,
    pub cancel: CancellationToken,
    pub progress: Option<ProgressFn>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            ignore: IgnoreConfig::default(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }
}

/// The deduplicated, validated target list of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub targets: Vec<ScanTarget>,
    /// Entries that are not valid GitHub logins.
    pub skipped: Vec<String>,
}

/// Resolves targets and drives a [`ScanWorkerPool`] over them.
pub struct ScanOrchestrator {
    gateway: Arc<dyn Gateway>,
    engine: Arc<IndicatorEngine>,
    options: ScanOptions,
}

impl ScanOrchestrator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        engine: Arc<IndicatorEngine>,
        options: ScanOptions,
    ) -> Result<Self> {
        if options.workers < 1 {
            return Err(ScanError::InvalidWorkerCount(options.workers));
        }
        Ok(Self {
            gateway,
            engine,
            options,
        })
    }

    /// Resolves and scans `source` in one go.
    pub async fn run(&self, source: &TargetSource) -> Result<ScanReport> {
        let resolved = self.resolve(source).await?;
        self.scan(resolved).await
    }

    /// Turns `source` into the list of targets to scan.
    ///
    /// Organization enumeration failures abort the run. Blank entries are
    /// dropped, invalid logins are reported in
    /// [`ResolvedTargets::skipped`], duplicates (case-insensitive) and
    /// ignored users are removed. An empty result is
    /// [`ScanError::NoTargets`].
    pub async fn resolve(&self, source: &TargetSource) -> Result<ResolvedTargets> {
        let logins = match source {
            TargetSource::Users(users) => users.clone(),
            TargetSource::Organization(org) => {
                let members = self.gateway.list_org_members(org).try_collect::<Vec<_>>();
                let members = tokio::select! {
                    biased;
                    _ = self.options.cancel.cancelled() => return Err(ScanError::Cancelled),
                    members = members => members?,
                };
                info!(org = %org, members = members.len(), "enumerated organization members");
                members
            }
        };

        let resolved = self.normalize(logins);
        if resolved.targets.is_empty() {
            return Err(ScanError::NoTargets);
        }
        Ok(resolved)
    }

    /// Scans an already resolved target list.
    pub async fn scan(&self, resolved: ResolvedTargets) -> Result<ScanReport> {
        if resolved.targets.is_empty() {
            return Err(ScanError::NoTargets);
        }

        let mut pool = ScanWorkerPool::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.engine),
            self.options.workers,
        )?
        .with_ignore(self.options.ignore.clone())
        .with_cancellation(self.options.cancel.clone());
        if let Some(progress) = &self.options.progress {
            pool = pool.with_progress(Arc::clone(progress));
        }

        let outcome = pool.run(resolved.targets).await;
        let mut report = ScanReport::new(outcome.reports);
        report.cancelled = outcome.cancelled;
        report.skipped = resolved.skipped;
        Ok(report)
    }

    fn normalize(&self, logins: Vec<String>) -> ResolvedTargets {
        let mut seen = HashSet::new();
        let mut resolved = ResolvedTargets::default();

        for raw in logins {
            if raw.trim().is_empty() {
                continue;
            }
            let target = match ScanTarget::parse(&raw) {
                Ok(target) => target,
                Err(err) => {
                    warn!(error = %err, "skipping entry");
                    resolved.skipped.push(raw.trim().to_string());
                    continue;
                }
            };
            if self.options.ignore.should_ignore_user(target.login()) {
                debug!(target = %target, "user ignored by configuration");
                continue;
            }
            if seen.insert(target.key()) {
                resolved.targets.push(target);
            }
        }
        resolved
    }
}
