//! Versioned, loadable indicator rule set.
//!
//! The known-bad data (package releases, payload hashes, workflow patterns)
//! lives in a rule file rather than in code, so new waves of the worm only
//! need a new file. The built-in set is compiled from
//! `rules/shai-hulud.toml`.
//!
//! # Example Rule File
//!
//! ```toml
//! version = 1
//! suspicious_files = ["bundle.js"]
//!
//! [[packages]]
//! name = "foo"
//! versions = ["1.2.3"]
//!
//! [[file_signatures]]
//! sha256 = "46faab8ab153fae6e80e7cca38eab363075bb524edd79e42269217a083628f09"
//! description = "credential stealer payload"
//!
//! [[workflows.patterns]]
//! description = "posts secrets to webhook.site"
//! all_of = ["toJSON(secrets)", "webhook.site"]
//! ```

use crate::error::ScanError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Rule file layout understood by this build.
pub const RULES_VERSION: u32 = 1;

const BUILTIN_RULES: &str = include_str!("../../rules/shai-hulud.toml");

/// Version wildcard matching every release of a package.
pub const ANY_VERSION: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRules {
    pub version: u32,

    /// Compromised package releases.
    #[serde(default)]
    pub packages: Vec<PackageRule>,

    /// SHA-256 digests of known payload files.
    #[serde(default)]
    pub file_signatures: Vec<FileSignature>,

    /// Substrings that only appear in malicious files.
    #[serde(default)]
    pub content_snippets: Vec<ContentSnippet>,

    #[serde(default)]
    pub workflows: WorkflowRules,

    /// Top-level file names the worm drops; fetched so their content can
    /// be checked against signatures and snippets.
    #[serde(default)]
    pub suspicious_files: Vec<String>,

    #[serde(default)]
    pub repository_markers: RepositoryMarkers,

    /// When set, top-level files of repositories pushed within this window
    /// are fetched as well.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compromise_window: Option<CompromiseWindow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRule {
    pub name: String,
    /// Exact versions, or `"*"` for every version.
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignature {
    pub sha256: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSnippet {
    pub pattern: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowRules {
    /// Workflow file names that are malicious on their own.
    pub file_names: Vec<String>,
    pub patterns: Vec<WorkflowPattern>,
}

/// Matches a workflow file containing every one of `all_of`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPattern {
    pub description: String,
    pub all_of: Vec<String>,
}

/// Markers visible in repository metadata, without fetching any file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryMarkers {
    pub description_contains: Vec<String>,
    /// Repository names the worm creates (case-insensitive).
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompromiseWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CompromiseWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

impl IndicatorRules {
    /// An empty rule set: nothing ever matches.
    pub fn empty() -> Self {
        Self {
            version: RULES_VERSION,
            packages: Vec::new(),
            file_signatures: Vec::new(),
            content_snippets: Vec::new(),
            workflows: WorkflowRules::default(),
            suspicious_files: Vec::new(),
            repository_markers: RepositoryMarkers::default(),
            compromise_window: None,
        }
    }

    /// The rule set shipped with the binary.
    pub fn builtin() -> Result<Self, ScanError> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    /// Loads rules from a `.json` or `.toml` file (anything not ending in
    /// `.json` is read as TOML).
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ScanError::Rules(format!("cannot read {}: {}", path.display(), e)))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ScanError> {
        let rules: Self = toml::from_str(content).map_err(|e| ScanError::Rules(e.to_string()))?;
        rules.validated()
    }

    pub fn from_json_str(content: &str) -> Result<Self, ScanError> {
        let rules: Self =
            serde_json::from_str(content).map_err(|e| ScanError::Rules(e.to_string()))?;
        rules.validated()
    }

    /// Checks the version and normalizes hashes to lowercase hex.
    fn validated(mut self) -> Result<Self, ScanError> {
        if self.version != RULES_VERSION {
            return Err(ScanError::Rules(format!(
                "unsupported rules version {} (expected {})",
                self.version, RULES_VERSION
            )));
        }

        for package in &self.packages {
            if package.name.trim().is_empty() {
                return Err(ScanError::Rules("package rule without a name".into()));
            }
            if package.versions.is_empty() {
                return Err(ScanError::Rules(format!(
                    "package rule {:?} lists no versions (use \"*\" for all)",
                    package.name
                )));
            }
        }

        for signature in &mut self.file_signatures {
            let hash = signature.sha256.trim().to_ascii_lowercase();
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ScanError::Rules(format!(
                    "invalid sha256 digest {:?}",
                    signature.sha256
                )));
            }
            signature.sha256 = hash;
        }

        if self.content_snippets.iter().any(|s| s.pattern.is_empty()) {
            return Err(ScanError::Rules("empty content snippet".into()));
        }

        if self.workflows.patterns.iter().any(|p| {
            p.all_of.is_empty() || p.all_of.iter().any(|marker| marker.is_empty())
        }) {
            return Err(ScanError::Rules(
                "workflow pattern needs at least one non-empty marker".into(),
            ));
        }

        if let Some(window) = &self.compromise_window {
            if window.start > window.end {
                return Err(ScanError::Rules(
                    "compromise window starts after it ends".into(),
                ));
            }
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn test_builtin_rules_parse() {
        let rules = IndicatorRules::builtin().unwrap();
        assert_eq!(rules.version, RULES_VERSION);
        assert!(rules
            .packages
            .iter()
            .any(|p| p.name == "@ctrl/tinycolor" && p.versions.contains(&"4.1.1".to_string())));
        assert!(!rules.file_signatures.is_empty());
        assert!(!rules.workflows.patterns.is_empty());
        assert!(rules.compromise_window.is_some());
        assert!(rules
            .repository_markers
            .description_contains
            .iter()
            .any(|m| m == "Sha1-Hulud: The Second Coming."));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let err = IndicatorRules::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ScanError::Rules(msg) if msg.contains("version 2")));
    }

    #[test]
    fn test_rejects_bad_hash() {
        let content = r#"
            version = 1
            [[file_signatures]]
            sha256 = "not-a-hash"
            description = "x"
        "#;
        assert!(IndicatorRules::from_toml_str(content).is_err());
    }

    #[test]
    fn test_normalizes_hash_case() {
        let content = r#"
            version = 1
            [[file_signatures]]
            sha256 = "46FAAB8AB153FAE6E80E7CCA38EAB363075BB524EDD79E42269217A083628F09"
            description = "payload"
        "#;
        let rules = IndicatorRules::from_toml_str(content).unwrap();
        assert_eq!(
            rules.file_signatures[0].sha256,
            "46faab8ab153fae6e80e7cca38eab363075bb524edd79e42269217a083628f09"
        );
    }

    #[test]
    fn test_rejects_package_without_versions() {
        let content = r#"
            version = 1
            [[packages]]
            name = "foo"
            versions = []
        "#;
        assert!(IndicatorRules::from_toml_str(content).is_err());
    }

    #[test]
    fn test_load_json_and_toml_files() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("rules.json");
        let mut file = fs::File::create(&json_path).unwrap();
        write!(
            file,
            r#"{{"version":1,"packages":[{{"name":"foo","versions":["1.2.3"]}}]}}"#
        )
        .unwrap();
        let rules = IndicatorRules::load(&json_path).unwrap();
        assert_eq!(rules.packages[0].name, "foo");

        let toml_path = dir.path().join("rules.toml");
        fs::write(&toml_path, "version = 1\nsuspicious_files = [\"bundle.js\"]\n").unwrap();
        let rules = IndicatorRules::load(&toml_path).unwrap();
        assert_eq!(rules.suspicious_files, vec!["bundle.js".to_string()]);

        assert!(IndicatorRules::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_compromise_window_contains() {
        let window = CompromiseWindow {
            start: Utc.with_ymd_and_hms(2025, 9, 14, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap(),
        };
        assert!(window.contains(Utc.with_ymd_and_hms(2025, 9, 16, 12, 0, 0).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap()));
    }
}
