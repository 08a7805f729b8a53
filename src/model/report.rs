use super::{Indicator, RepositoryRef, ScanTarget};
use crate::error::ScanError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Clean,
    Compromised,
    Error,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingStatus::Clean => "clean",
            FindingStatus::Compromised => "compromised",
            FindingStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason attached to an errored finding or target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub reason: String,
    pub message: String,
}

impl From<&ScanError> for ErrorInfo {
    fn from(err: &ScanError) -> Self {
        Self {
            reason: err.reason().to_string(),
            message: err.to_string(),
        }
    }
}

/// Verdict for one repository of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub repository: RepositoryRef,
    pub status: FindingStatus,
    pub indicators: Vec<Indicator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Finding {
    /// Builds the finding for an evaluated repository; any indicator makes
    /// it compromised.
    pub fn evaluated(repository: RepositoryRef, indicators: BTreeSet<Indicator>) -> Self {
        let status = if indicators.is_empty() {
            FindingStatus::Clean
        } else {
            FindingStatus::Compromised
        };
        Self {
            repository,
            status,
            indicators: indicators.into_iter().collect(),
            error: None,
        }
    }

    pub fn failed(repository: RepositoryRef, err: &ScanError) -> Self {
        Self {
            repository,
            status: FindingStatus::Error,
            indicators: Vec::new(),
            error: Some(err.into()),
        }
    }
}

/// All repository findings for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: ScanTarget,
    pub status: FindingStatus,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl TargetReport {
    /// Report for a target whose repositories were all listed. Compromised
    /// if any repository is; repository-level fetch errors do not turn the
    /// target into an error.
    pub fn clean(target: ScanTarget, findings: Vec<Finding>) -> Self {
        let status = if findings
            .iter()
            .any(|f| f.status == FindingStatus::Compromised)
        {
            FindingStatus::Compromised
        } else {
            FindingStatus::Clean
        };
        Self {
            target,
            status,
            findings,
            error: None,
        }
    }

    /// Report for a target whose repository listing failed. Findings that
    /// were completed before the failure are kept; a compromise among them
    /// still wins over the error.
    pub fn failed(target: ScanTarget, findings: Vec<Finding>, err: &ScanError) -> Self {
        let mut report = Self::clean(target, findings);
        if report.status != FindingStatus::Compromised {
            report.status = FindingStatus::Error;
        }
        report.error = Some(err.into());
        report
    }

    pub fn indicator_count(&self) -> usize {
        self.findings.iter().map(|f| f.indicators.len()).sum()
    }

    pub fn compromised_repositories(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.status == FindingStatus::Compromised)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub targets_scanned: usize,
    pub compromised: usize,
    pub errored: usize,
    pub repositories_scanned: usize,
    pub repositories_errored: usize,
    pub indicators: usize,
}

impl ScanSummary {
    pub fn from_targets(targets: &[TargetReport]) -> Self {
        let mut summary = Self {
            targets_scanned: targets.len(),
            ..Self::default()
        };
        for target in targets {
            match target.status {
                FindingStatus::Compromised => summary.compromised += 1,
                FindingStatus::Error => summary.errored += 1,
                FindingStatus::Clean => {}
            }
            summary.repositories_scanned += target.findings.len();
            summary.repositories_errored += target
                .findings
                .iter()
                .filter(|f| f.status == FindingStatus::Error)
                .count();
            summary.indicators += target.indicator_count();
        }
        summary
    }
}

/// Complete results of one scan run, in original target order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_time: DateTime<Utc>,
    pub targets: Vec<TargetReport>,
    pub summary: ScanSummary,
    /// True when the run was interrupted; `targets` then holds only the
    /// targets that finished.
    #[serde(default)]
    pub cancelled: bool,
    /// Input entries dropped because they are not valid GitHub logins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl ScanReport {
    pub fn new(targets: Vec<TargetReport>) -> Self {
        let summary = ScanSummary::from_targets(&targets);
        Self {
            scan_time: Utc::now(),
            targets,
            summary,
            cancelled: false,
            skipped: Vec::new(),
        }
    }

    pub fn is_compromised(&self) -> bool {
        self.summary.compromised > 0
    }

    pub fn target(&self, login: &str) -> Option<&TargetReport> {
        self.targets
            .iter()
            .find(|t| t.target.login().eq_ignore_ascii_case(login))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IndicatorKind;

    fn repo(name: &str) -> RepositoryRef {
        RepositoryRef::new("alice", name, "main")
    }

    fn indicator() -> Indicator {
        Indicator::new(
            IndicatorKind::KnownMaliciousPackageDependency,
            "compromised release",
            Some("package.json"),
            "foo@1.2.3",
        )
    }

    #[test]
    fn test_finding_status_follows_indicators() {
        let clean = Finding::evaluated(repo("a"), BTreeSet::new());
        assert_eq!(clean.status, FindingStatus::Clean);

        let hit = Finding::evaluated(repo("b"), BTreeSet::from([indicator()]));
        assert_eq!(hit.status, FindingStatus::Compromised);
        assert_eq!(hit.indicators.len(), 1);
    }

    #[test]
    fn test_target_failed_keeps_compromise() {
        let target = ScanTarget::parse("alice").unwrap();
        let err = ScanError::UserNotFound("alice".into());

        let failed = TargetReport::failed(target.clone(), Vec::new(), &err);
        assert_eq!(failed.status, FindingStatus::Error);
        assert_eq!(failed.error.as_ref().unwrap().reason, "UserNotFound");

        let hit = Finding::evaluated(repo("b"), BTreeSet::from([indicator()]));
        let partial = TargetReport::failed(target, vec![hit], &err);
        assert_eq!(partial.status, FindingStatus::Compromised);
        assert!(partial.error.is_some());
    }

    #[test]
    fn test_repo_error_does_not_fail_target() {
        let target = ScanTarget::parse("alice").unwrap();
        let err = ScanError::RepoFetch {
            repo: "alice/a".into(),
            source: Box::new(ScanError::Unauthorized),
        };
        let report = TargetReport::clean(
            target,
            vec![
                Finding::failed(repo("a"), &err),
                Finding::evaluated(repo("b"), BTreeSet::new()),
            ],
        );
        assert_eq!(report.status, FindingStatus::Clean);
    }

    #[test]
    fn test_summary_counts() {
        let alice = ScanTarget::parse("alice").unwrap();
        let bob = ScanTarget::parse("bob").unwrap();
        let carol = ScanTarget::parse("carol").unwrap();
        let err = ScanError::UserNotFound("carol".into());

        let report = ScanReport::new(vec![
            TargetReport::clean(
                alice,
                vec![Finding::evaluated(repo("a"), BTreeSet::from([indicator()]))],
            ),
            TargetReport::clean(bob, vec![Finding::evaluated(repo("b"), BTreeSet::new())]),
            TargetReport::failed(carol, Vec::new(), &err),
        ]);

        assert_eq!(report.summary.targets_scanned, 3);
        assert_eq!(report.summary.compromised, 1);
        assert_eq!(report.summary.errored, 1);
        assert_eq!(report.summary.repositories_scanned, 2);
        assert_eq!(report.summary.indicators, 1);
        assert!(report.is_compromised());
        assert!(report.target("ALICE").is_some());
    }
}
