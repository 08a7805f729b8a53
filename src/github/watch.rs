//! Selection of the repository files worth fetching.

use crate::checker::{lockfile, CompromiseWindow, IndicatorRules, WORKFLOW_DIR};
use crate::model::RepositoryRef;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::warn;

/// Size limit for manifests, workflows and other watched files.
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Size limit for known payload file names. The worm's `bundle.js` is
/// several megabytes; GitHub serves raw contents up to 100 MiB.
pub const MAX_PAYLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Upper bound on content requests per repository.
pub const MAX_FILES: usize = 50;

/// One entry of a recursive git tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            kind: "blob".to_string(),
            size: Some(size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Watched {
    SuspiciousFile,
    Workflow,
    Manifest,
    RecentTopLevel,
}

/// Decides which paths of a repository tree get their content fetched:
/// npm manifests and lockfiles, CI workflows, the worm's known drop files,
/// and top-level files of repositories pushed during the compromise window.
#[derive(Debug, Clone)]
pub struct WatchList {
    suspicious_files: HashSet<String>,
    window: Option<CompromiseWindow>,
    max_file_size: u64,
    max_payload_size: u64,
    max_files: usize,
}

impl WatchList {
    pub fn from_rules(rules: &IndicatorRules) -> Self {
        Self {
            suspicious_files: rules
                .suspicious_files
                .iter()
                .map(|name| name.to_ascii_lowercase())
                .collect(),
            window: rules.compromise_window,
            max_file_size: MAX_FILE_SIZE,
            max_payload_size: MAX_PAYLOAD_SIZE,
            max_files: MAX_FILES,
        }
    }

    pub fn with_limits(mut self, max_file_size: u64, max_files: usize) -> Self {
        self.max_file_size = max_file_size;
        self.max_files = max_files;
        self
    }

    /// Picks the entries to fetch, capped at the per-repository file limit.
    /// Known payload names come first, then workflows, then manifests, so
    /// a large monorepo cannot push the direct indicators past the cap.
    pub fn select<'a>(&self, repo: &RepositoryRef, tree: &'a [TreeEntry]) -> Vec<&'a TreeEntry> {
        let recently_pushed = match (self.window, repo.pushed_at) {
            (Some(window), Some(pushed_at)) => window.contains(pushed_at),
            _ => false,
        };

        let mut picked: Vec<(Watched, &TreeEntry)> = tree
            .iter()
            .filter(|entry| entry.kind == "blob")
            .filter_map(|entry| {
                self.classify(&entry.path, recently_pushed)
                    .map(|watched| (watched, entry))
            })
            .filter(|(watched, entry)| entry.size.unwrap_or(0) <= self.size_limit(*watched))
            .collect();

        picked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.path.cmp(&b.1.path)));
        if picked.len() > self.max_files {
            warn!(
                repo = %repo.full_name(),
                watched = picked.len(),
                limit = self.max_files,
                first_skipped = %picked[self.max_files].1.path,
                "too many watched files, some were not inspected"
            );
            picked.truncate(self.max_files);
        }
        picked.into_iter().map(|(_, entry)| entry).collect()
    }

    fn size_limit(&self, watched: Watched) -> u64 {
        match watched {
            Watched::SuspiciousFile => self.max_payload_size.max(self.max_file_size),
            _ => self.max_file_size,
        }
    }

    fn classify(&self, path: &str, recently_pushed: bool) -> Option<Watched> {
        let top_level = !path.contains('/');

        if top_level && self.suspicious_files.contains(&path.to_ascii_lowercase()) {
            return Some(Watched::SuspiciousFile);
        }

        if lockfile::is_dependency_file(path) && !path.split('/').any(|seg| seg == "node_modules") {
            return Some(Watched::Manifest);
        }
        if let Some(name) = path.strip_prefix(WORKFLOW_DIR) {
            if !name.contains('/') && (name.ends_with(".yml") || name.ends_with(".yaml")) {
                return Some(Watched::Workflow);
            }
        }
        if top_level && recently_pushed {
            return Some(Watched::RecentTopLevel);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rules() -> IndicatorRules {
        let mut rules = IndicatorRules::empty();
        rules.suspicious_files = vec!["bundle.js".into()];
        rules.compromise_window = Some(CompromiseWindow {
            start: Utc.with_ymd_and_hms(2025, 9, 14, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap(),
        });
        rules
    }

    fn tree() -> Vec<TreeEntry> {
        vec![
            TreeEntry::blob("README.md", 100),
            TreeEntry::blob("package.json", 500),
            TreeEntry::blob("web/yarn.lock", 9000),
            TreeEntry::blob("node_modules/x/package.json", 100),
            TreeEntry::blob(".github/workflows/ci.yml", 300),
            TreeEntry::blob(".github/workflows/nested/x.yml", 300),
            TreeEntry::blob(".github/dependabot.yml", 300),
            TreeEntry::blob("bundle.js", 3_000_000),
            TreeEntry::blob("src/bundle.js", 100),
            TreeEntry {
                path: ".github/workflows".into(),
                kind: "tree".into(),
                size: None,
            },
        ]
    }

    fn paths(entries: Vec<&TreeEntry>) -> Vec<&str> {
        entries.into_iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_select_outside_window() {
        let watch = WatchList::from_rules(&rules());
        let repo = RepositoryRef::new("alice", "app", "main")
            .with_pushed_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let tree = tree();
        assert_eq!(
            paths(watch.select(&repo, &tree)),
            vec!["bundle.js", ".github/workflows/ci.yml", "package.json", "web/yarn.lock"]
        );
    }

    #[test]
    fn test_select_inside_window_adds_top_level_files() {
        let watch = WatchList::from_rules(&rules());
        let repo = RepositoryRef::new("alice", "app", "main")
            .with_pushed_at(Utc.with_ymd_and_hms(2025, 9, 16, 0, 0, 0).unwrap());
        let mut tree = tree();
        tree.push(TreeEntry::blob("dump.tar", 3 * MAX_FILE_SIZE));
        assert_eq!(
            paths(watch.select(&repo, &tree)),
            vec![
                "bundle.js",
                ".github/workflows/ci.yml",
                "package.json",
                "web/yarn.lock",
                "README.md",
            ]
        );
    }

    #[test]
    fn test_payload_sized_bundle_is_selected() {
        let watch = WatchList::from_rules(&IndicatorRules::builtin().unwrap());
        let repo = RepositoryRef::new("alice", "app", "main");
        let tree = vec![
            TreeEntry::blob("bundle.js", 3_600_000),
            TreeEntry::blob("vendor.js", 3_600_000),
        ];
        assert_eq!(paths(watch.select(&repo, &tree)), vec!["bundle.js"]);

        let oversized = vec![TreeEntry::blob("bundle.js", MAX_PAYLOAD_SIZE + 1)];
        assert!(watch.select(&repo, &oversized).is_empty());
    }

    #[test]
    fn test_file_cap_keeps_workflows_ahead_of_manifests() {
        let watch = WatchList::from_rules(&rules());
        let repo = RepositoryRef::new("alice", "monorepo", "main");
        let mut tree: Vec<TreeEntry> = (0..60)
            .map(|i| TreeEntry::blob(format!("packages/p{i:02}/package.json"), 400))
            .collect();
        tree.push(TreeEntry::blob(".github/workflows/shai-hulud-workflow.yml", 300));

        let picked = paths(watch.select(&repo, &tree));
        assert_eq!(picked.len(), MAX_FILES);
        assert_eq!(picked[0], ".github/workflows/shai-hulud-workflow.yml");
        assert_eq!(picked[MAX_FILES - 1], "packages/p48/package.json");
    }

    #[test]
    fn test_select_respects_file_cap() {
        let watch = WatchList::from_rules(&rules()).with_limits(MAX_FILE_SIZE, 2);
        let repo = RepositoryRef::new("alice", "app", "main");
        let tree = tree();
        assert_eq!(
            paths(watch.select(&repo, &tree)),
            vec!["bundle.js", ".github/workflows/ci.yml"]
        );
    }
}
