use super::lockfile;
use super::rules::{ContentSnippet, IndicatorRules, WorkflowPattern, ANY_VERSION};
use crate::model::{Indicator, IndicatorKind, RepoFiles, RepositoryRef};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::trace;

/// Directory GitHub Actions reads workflows from.
pub const WORKFLOW_DIR: &str = ".github/workflows/";

#[derive(Debug, Clone)]
enum VersionSet {
    Any,
    Only(HashSet<String>),
}

/// Evaluates repositories against an [`IndicatorRules`] set.
///
/// Construction indexes the rules once; evaluation is pure and performs
/// no I/O, so the same inputs always give the same indicator set.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    packages: HashMap<String, VersionSet>,
    signatures: HashMap<String, String>,
    snippets: Vec<ContentSnippet>,
    workflow_names: HashSet<String>,
    workflow_patterns: Vec<WorkflowPattern>,
    description_markers: Vec<String>,
    repository_names: HashSet<String>,
}

impl IndicatorEngine {
    pub fn new(rules: &IndicatorRules) -> Self {
        let mut packages: HashMap<String, VersionSet> = HashMap::new();
        for rule in &rules.packages {
            let entry = packages
                .entry(rule.name.trim().to_string())
                .or_insert_with(|| VersionSet::Only(HashSet::new()));
            for version in &rule.versions {
                if version.trim() == ANY_VERSION {
                    *entry = VersionSet::Any;
                } else if let VersionSet::Only(set) = &mut *entry {
                    set.insert(
                        normalize_version(version).unwrap_or_else(|| version.trim().to_string()),
                    );
                }
            }
        }

        Self {
            packages,
            signatures: rules
                .file_signatures
                .iter()
                .map(|s| (s.sha256.clone(), s.description.clone()))
                .collect(),
            snippets: rules.content_snippets.clone(),
            workflow_names: rules
                .workflows
                .file_names
                .iter()
                .map(|n| n.to_ascii_lowercase())
                .collect(),
            workflow_patterns: rules.workflows.patterns.clone(),
            description_markers: rules.repository_markers.description_contains.clone(),
            repository_names: rules
                .repository_markers
                .names
                .iter()
                .map(|n| n.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Applies the dependency, signature and workflow rules to the fetched
    /// files of `repo`. Empty `files` always give an empty set.
    pub fn evaluate(&self, repo: &RepositoryRef, files: &RepoFiles) -> BTreeSet<Indicator> {
        trace!(repo = %repo.full_name(), files = files.len(), "evaluating");
        let mut found = BTreeSet::new();

        for (path, content) in files {
            let text = String::from_utf8_lossy(content);

            if lockfile::is_dependency_file(path) {
                self.check_dependencies(path, &text, &mut found);
            }
            self.check_signatures(path, content, &text, &mut found);
            if path.starts_with(WORKFLOW_DIR) {
                self.check_workflow(path, &text, &mut found);
            }
        }

        found
    }

    /// Applies the repository-marker rules to repository metadata.
    pub fn evaluate_metadata(&self, repo: &RepositoryRef) -> BTreeSet<Indicator> {
        let mut found = BTreeSet::new();

        if let Some(description) = repo.description.as_deref() {
            for marker in &self.description_markers {
                if description.contains(marker.as_str()) {
                    found.insert(Indicator::new(
                        IndicatorKind::RepositoryMarker,
                        "Repository description carries the worm's marker",
                        None,
                        marker.clone(),
                    ));
                }
            }
        }

        if self.repository_names.contains(&repo.name.to_ascii_lowercase()) {
            found.insert(Indicator::new(
                IndicatorKind::RepositoryMarker,
                "Repository name matches one created by the worm",
                None,
                repo.name.clone(),
            ));
        }

        found
    }

    fn check_dependencies(&self, path: &str, text: &str, found: &mut BTreeSet<Indicator>) {
        for dep in lockfile::extract(path, text) {
            let Some(versions) = self.packages.get(&dep.name) else {
                continue;
            };
            let hit = match versions {
                VersionSet::Any => true,
                VersionSet::Only(set) => normalize_version(&dep.version)
                    .map(|v| set.contains(&v))
                    .unwrap_or(false),
            };
            if hit {
                found.insert(Indicator::new(
                    IndicatorKind::KnownMaliciousPackageDependency,
                    format!("{}@{} is a known compromised release", dep.name, dep.version),
                    Some(path),
                    format!("{}@{}", dep.name, dep.version),
                ));
            }
        }
    }

    fn check_signatures(
        &self,
        path: &str,
        content: &[u8],
        text: &str,
        found: &mut BTreeSet<Indicator>,
    ) {
        if !self.signatures.is_empty() {
            let digest = format!("{:x}", Sha256::digest(content));
            if let Some(description) = self.signatures.get(&digest) {
                found.insert(Indicator::new(
                    IndicatorKind::KnownMaliciousFileSignature,
                    description.clone(),
                    Some(path),
                    digest,
                ));
            }
        }

        // Docs may quote indicators (advisories, incident write-ups).
        if is_documentation(path) {
            return;
        }
        for snippet in &self.snippets {
            if text.contains(snippet.pattern.as_str()) {
                found.insert(Indicator::new(
                    IndicatorKind::KnownMaliciousFileSignature,
                    snippet.description.clone(),
                    Some(path),
                    snippet.pattern.clone(),
                ));
            }
        }
    }

    fn check_workflow(&self, path: &str, text: &str, found: &mut BTreeSet<Indicator>) {
        let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
        if self.workflow_names.contains(&name) {
            found.insert(Indicator::new(
                IndicatorKind::SuspiciousWorkflowFile,
                "Known malicious workflow file",
                Some(path),
                name,
            ));
        }

        for pattern in &self.workflow_patterns {
            if pattern.all_of.iter().all(|marker| text.contains(marker.as_str())) {
                found.insert(Indicator::new(
                    IndicatorKind::SuspiciousWorkflowFile,
                    pattern.description.clone(),
                    Some(path),
                    pattern.all_of.join(" + "),
                ));
            }
        }
    }
}

/// Canonical form of an exact version (`=1.2.3`, `v1.2.3` -> `1.2.3`).
/// Ranges and tags yield `None`.
fn is_documentation(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    matches!(name.as_str(), "readme" | "changelog" | "security" | "license")
        || [".md", ".markdown", ".rst", ".txt", ".adoc"]
            .iter()
            .any(|ext| name.ends_with(ext))
}

fn normalize_version(version: &str) -> Option<String> {
    let trimmed = version.trim().trim_start_matches('=').trim_start_matches('v').trim();
    semver::Version::parse(trimmed).ok().map(|v| v.to_string())
}
