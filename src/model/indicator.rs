use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    KnownMaliciousPackageDependency,
    KnownMaliciousFileSignature,
    SuspiciousWorkflowFile,
    RepositoryMarker,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::KnownMaliciousPackageDependency => "malicious-dependency",
            IndicatorKind::KnownMaliciousFileSignature => "malicious-file",
            IndicatorKind::SuspiciousWorkflowFile => "suspicious-workflow",
            IndicatorKind::RepositoryMarker => "repository-marker",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            IndicatorKind::KnownMaliciousPackageDependency => "Malicious dependency",
            IndicatorKind::KnownMaliciousFileSignature => "Malicious file",
            IndicatorKind::SuspiciousWorkflowFile => "Suspicious workflow",
            IndicatorKind::RepositoryMarker => "Repository marker",
        }
    }
}

impl std::fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// What triggered an indicator: the file (if any) and the matched value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub matched: String,
}

/// A single sign of compromise found in a repository.
///
/// Ordering is derived so indicator sets iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Indicator {
    pub kind: IndicatorKind,
    pub description: String,
    pub evidence: Evidence,
}

impl Indicator {
    pub fn new(
        kind: IndicatorKind,
        description: impl Into<String>,
        path: Option<&str>,
        matched: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            description: description.into(),
            evidence: Evidence {
                path: path.map(str::to_string),
                matched: matched.into(),
            },
        }
    }
}
