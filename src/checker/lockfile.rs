//! Dependency extraction from npm manifests and lockfiles.
//!
//! Supported inputs:
//! - `package.json` (all dependency sections, including `npm:` aliases)
//! - `package-lock.json` / `npm-shrinkwrap.json` (lockfile v1, v2 and v3)
//! - `yarn.lock` (classic v1 and berry)

use serde_json::Value;

/// A dependency declaration as found in a file. For `package.json` the
/// version is the declared spec, which may be a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

impl Dependency {
    fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

const MANIFEST_SECTIONS: &[&str] = &[
    "dependencies",
    "devDependencies",
    "optionalDependencies",
    "peerDependencies",
];

/// Returns true if `path` names a file [`extract`] understands.
pub fn is_dependency_file(path: &str) -> bool {
    matches!(
        file_name(path),
        "package.json" | "package-lock.json" | "npm-shrinkwrap.json" | "yarn.lock"
    )
}

/// Extracts dependencies from the file at `path`. Unparseable content
/// yields no dependencies.
pub fn extract(path: &str, content: &str) -> Vec<Dependency> {
    match file_name(path) {
        "package.json" => parse_package_json(content),
        "package-lock.json" | "npm-shrinkwrap.json" => parse_package_lock(content),
        "yarn.lock" => parse_yarn_lock(content),
        _ => Vec::new(),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn parse_package_json(content: &str) -> Vec<Dependency> {
    let Ok(manifest) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    let mut deps = Vec::new();
    for section in MANIFEST_SECTIONS {
        let Some(entries) = manifest.get(section).and_then(Value::as_object) else {
            continue;
        };
        for (name, spec) in entries {
            let Some(spec) = spec.as_str() else {
                continue;
            };
            // "alias": "npm:real-name@1.2.3"
            if let Some((real, version)) = spec.strip_prefix("npm:").and_then(split_name_version) {
                deps.push(Dependency::new(real, version));
            } else {
                deps.push(Dependency::new(name.as_str(), spec));
            }
        }
    }
    deps
}

fn parse_package_lock(content: &str) -> Vec<Dependency> {
    let Ok(lock) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    let mut deps = Vec::new();

    // v2/v3: flat map keyed by install path.
    if let Some(packages) = lock.get("packages").and_then(Value::as_object) {
        for (key, entry) in packages {
            let Some(idx) = key.rfind("node_modules/") else {
                continue;
            };
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&key[idx + "node_modules/".len()..]);
            if let Some(version) = entry.get("version").and_then(Value::as_str) {
                deps.push(Dependency::new(name, version));
            }
        }
    }

    // v1 (and the legacy mirror in v2): nested tree.
    if let Some(tree) = lock.get("dependencies").and_then(Value::as_object) {
        collect_lock_v1(tree, &mut deps);
    }

    deps
}

fn collect_lock_v1(tree: &serde_json::Map<String, Value>, deps: &mut Vec<Dependency>) {
    for (name, entry) in tree {
        if let Some(version) = entry.get("version").and_then(Value::as_str) {
            deps.push(Dependency::new(name.as_str(), version));
        }
        if let Some(nested) = entry.get("dependencies").and_then(Value::as_object) {
            collect_lock_v1(nested, deps);
        }
    }
}

fn parse_yarn_lock(content: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        if !line.starts_with(' ') && line.ends_with(':') {
            // Entry header: `"a@^1.0.0", a@~1.0.2:` or `"a@npm:^1.0.0":`
            current = line
                .trim_end_matches(':')
                .split(',')
                .filter_map(|spec| {
                    let spec = spec.trim().trim_matches('"');
                    split_name_version(spec).map(|(name, _)| name.to_string())
                })
                .collect();
            current.dedup();
            continue;
        }

        let trimmed = line.trim();
        let version = trimmed
            .strip_prefix("version:")
            .or_else(|| trimmed.strip_prefix("version "))
            .map(|v| v.trim().trim_matches('"'));

        if let Some(version) = version {
            for name in &current {
                deps.push(Dependency::new(name.as_str(), version));
            }
        }
    }

    deps
}

/// Splits `name@version`, keeping the leading `@` of scoped names.
fn split_name_version(spec: &str) -> Option<(&str, &str)> {
    let search_from = usize::from(spec.starts_with('@'));
    let at = spec[search_from..].find('@')? + search_from;
    let name = &spec[..at];
    let version = &spec[at + 1..];
    if name.is_empty() {
        None
    } else {
        Some((name, version))
    }
}
