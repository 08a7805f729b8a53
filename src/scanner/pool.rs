use crate::checker::IndicatorEngine;
use crate::config::IgnoreConfig;
use crate::error::{Result, ScanError};
use crate::github::Gateway;
use crate::model::{Finding, RepositoryRef, ScanTarget, TargetReport};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_WORKERS: usize = 5;

/// Called once per finished target, from the worker that finished it.
pub type ProgressFn = Arc<dyn Fn(&TargetReport) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetState {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// Per-target state and results, indexed by input position. Every write
/// goes through `start` or `finish` under the pool's aggregate lock.
#[derive(Default)]
struct Aggregate {
    states: Vec<TargetState>,
    reports: Vec<Option<TargetReport>>,
}

impl Aggregate {
    fn new(len: usize) -> Self {
        Self {
            states: vec![TargetState::Pending; len],
            reports: vec![None; len],
        }
    }

    fn start(&mut self, index: usize) {
        if let Some(state) = self.states.get_mut(index) {
            if *state == TargetState::Pending {
                *state = TargetState::InFlight;
            }
        }
    }

    fn finish(&mut self, index: usize, report: TargetReport) {
        match self.states.get(index).copied() {
            Some(TargetState::InFlight) => {
                self.states[index] = if report.error.is_some() {
                    TargetState::Failed
                } else {
                    TargetState::Done
                };
                self.reports[index] = Some(report);
            }
            state => warn!(index, ?state, "ignoring result for a target that is not in flight"),
        }
    }

    fn unfinished(&self) -> usize {
        self.states
            .iter()
            .filter(|s| matches!(s, TargetState::Pending | TargetState::InFlight))
            .count()
    }

    /// Finished reports in input order.
    fn into_reports(self) -> Vec<TargetReport> {
        self.reports.into_iter().flatten().collect()
    }
}

/// Result of one pool run.
#[derive(Debug)]
pub struct PoolOutcome {
    /// Finished targets, in input order.
    pub reports: Vec<TargetReport>,
    /// True if cancellation left some targets unscanned.
    pub cancelled: bool,
}

struct Shared {
    gateway: Arc<dyn Gateway>,
    engine: Arc<IndicatorEngine>,
    ignore: IgnoreConfig,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
    queue: Mutex<VecDeque<(usize, ScanTarget)>>,
    aggregate: Mutex<Aggregate>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fixed-size pool of workers scanning targets end to end.
///
/// Each worker takes the next queued target, lists its repositories,
/// fetches and evaluates each one, then records the target's report before
/// taking the next. Completion order is arbitrary; [`PoolOutcome::reports`]
/// is always in input order.
pub struct ScanWorkerPool {
    gateway: Arc<dyn Gateway>,
    engine: Arc<IndicatorEngine>,
    workers: usize,
    ignore: IgnoreConfig,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl ScanWorkerPool {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        engine: Arc<IndicatorEngine>,
        workers: usize,
    ) -> Result<Self> {
        if workers < 1 {
            return Err(ScanError::InvalidWorkerCount(workers));
        }
        Ok(Self {
            gateway,
            engine,
            workers,
            ignore: IgnoreConfig::default(),
            cancel: CancellationToken::new(),
            progress: None,
        })
    }

    pub fn with_ignore(mut self, ignore: IgnoreConfig) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn run(&self, targets: Vec<ScanTarget>) -> PoolOutcome {
        let total = targets.len();
        let workers = self.workers.min(total);

        let shared = Arc::new(Shared {
            gateway: Arc::clone(&self.gateway),
            engine: Arc::clone(&self.engine),
            ignore: self.ignore.clone(),
            cancel: self.cancel.clone(),
            progress: self.progress.clone(),
            queue: Mutex::new(targets.into_iter().enumerate().collect()),
            aggregate: Mutex::new(Aggregate::new(total)),
        });

        debug!(targets = total, workers, "starting scan workers");
        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            tasks.spawn(run_worker(Arc::clone(&shared), worker));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "scan worker terminated abnormally");
            }
        }

        let aggregate = std::mem::take(&mut *lock(&shared.aggregate));
        let unfinished = aggregate.unfinished();
        if unfinished > 0 {
            warn!(unfinished, "scan stopped before all targets finished");
        }
        PoolOutcome {
            cancelled: unfinished > 0 && shared.cancel.is_cancelled(),
            reports: aggregate.into_reports(),
        }
    }
}

async fn run_worker(shared: Arc<Shared>, worker: usize) {
    loop {
        if shared.cancel.is_cancelled() {
            break;
        }
        let next = lock(&shared.queue).pop_front();
        let Some((index, target)) = next else {
            break;
        };
        lock(&shared.aggregate).start(index);
        debug!(worker, target = %target, "scanning target");

        let report = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            report = scan_target(&shared, target) => report,
        };

        info!(
            worker,
            target = %report.target,
            status = %report.status,
            repositories = report.findings.len(),
            "target finished"
        );
        if let Some(progress) = &shared.progress {
            progress(&report);
        }
        lock(&shared.aggregate).finish(index, report);
    }
}

async fn scan_target(shared: &Shared, target: ScanTarget) -> TargetReport {
    let login = target.login().to_string();
    let mut findings = Vec::new();
    let mut repos = shared.gateway.list_user_repos(&login);

    while let Some(listed) = repos.next().await {
        match listed {
            Ok(repo) => {
                if shared.ignore.should_ignore_repository(&repo.full_name()) {
                    debug!(repo = %repo.full_name(), "repository ignored by configuration");
                    continue;
                }
                findings.push(scan_repository(shared, repo).await);
            }
            Err(err) => {
                warn!(target = %login, error = %err, "listing repositories failed");
                return TargetReport::failed(target, findings, &err);
            }
        }
    }

    TargetReport::clean(target, findings)
}

async fn scan_repository(shared: &Shared, repo: RepositoryRef) -> Finding {
    let marked = shared.engine.evaluate_metadata(&repo);

    match shared.gateway.fetch_repo_manifest_files(&repo).await {
        Ok(files) => {
            let mut indicators = shared.engine.evaluate(&repo, &files);
            indicators.extend(marked);
            Finding::evaluated(repo, indicators)
        }
        Err(err) => {
            warn!(repo = %repo.full_name(), error = %err, "repository fetch failed");
            if marked.is_empty() {
                Finding::failed(repo, &err)
            } else {
                // Metadata alone already proves compromise.
                let mut finding = Finding::evaluated(repo, marked);
                finding.error = Some((&err).into());
                finding
            }
        }
    }
}
