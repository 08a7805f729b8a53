//! Configuration file handling.
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/hulud-scan/config.toml`
//! - macOS: `~/Library/Application Support/hulud-scan/config.toml`
//! - Windows: `%APPDATA%\hulud-scan\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! workers = 8
//! default_format = "json"
//! rules_path = "/etc/hulud-scan/rules.toml"
//!
//! [retry]
//! rate_limit_attempts = 5
//! max_reset_wait_secs = 900
//!
//! [ignore]
//! users = ["dependabot*"]
//! repositories = ["acme/archive-*"]
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::github::{ClientOptions, RetryPolicy, DEFAULT_API_URL};

/// Application configuration. Command-line flags override these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of concurrent scan workers.
    ///
    /// Default: 5
    pub workers: usize,

    /// Base URL of the GitHub REST API. Change this for GitHub Enterprise.
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    ///
    /// Default: 10
    pub request_timeout_secs: u64,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    pub default_format: String,

    /// Indicator rule file replacing the built-in rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<PathBuf>,

    pub retry: RetryConfig,

    pub ignore: IgnoreConfig,
}

/// Retry and rate-limit tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts for a rate-limited request.
    pub rate_limit_attempts: u32,
    /// Retries after a network error or 5xx response.
    pub server_error_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    /// First wait after a secondary rate limit without `Retry-After`.
    pub secondary_delay_secs: u64,
    /// Rate-limit resets further away than this fail the request instead
    /// of waiting.
    pub max_reset_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            rate_limit_attempts: policy.rate_limit_attempts,
            server_error_retries: policy.server_error_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_secs: policy.max_delay.as_secs(),
            secondary_delay_secs: policy.secondary_delay.as_secs(),
            max_reset_wait_secs: policy.max_reset_wait.as_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            rate_limit_attempts: self.rate_limit_attempts.max(1),
            server_error_retries: self.server_error_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            secondary_delay: Duration::from_secs(self.secondary_delay_secs),
            max_reset_wait: Duration::from_secs(self.max_reset_wait_secs),
        }
    }
}

/// Users and repositories to leave out of a scan.
///
/// Entries are matched case-insensitively and support `*` wildcards
/// (e.g. `"bot-*"`, `"acme/*-archive"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// GitHub logins that are never scanned.
    pub users: Vec<String>,

    /// Repositories (`owner/name`) that are never fetched.
    pub repositories: Vec<String>,
}

impl IgnoreConfig {
    pub fn should_ignore_user(&self, login: &str) -> bool {
        matches_any(&self.users, login)
    }

    pub fn should_ignore_repository(&self, full_name: &str) -> bool {
        matches_any(&self.repositories, full_name)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.repositories.is_empty()
    }
}

fn matches_any(patterns: &[String], value: &str) -> bool {
    let value = value.to_ascii_lowercase();
    patterns
        .iter()
        .any(|pattern| glob_match(&pattern.to_ascii_lowercase(), &value))
}

/// Simple glob matching (supports * as wildcard).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    let first = parts[0];
    if !remaining.starts_with(first) {
        return false;
    }
    remaining = &remaining[first.len()..];

    let last = parts[parts.len() - 1];
    if !remaining.ends_with(last) {
        return false;
    }
    remaining = &remaining[..remaining.len() - last.len()];

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }

    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 5,
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 10,
            default_format: "table".to_string(),
            rules_path: None,
            retry: RetryConfig::default(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration file, falling back to defaults when it does
    /// not exist.
    ///
    /// ```no_run
    /// use hulud_scan::Config;
    ///
    /// let config = Config::load()?;
    /// println!("workers: {}", config.workers);
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration, creating the parent directory if needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hulud-scan")
            .join("config.toml")
    }

    pub fn generate_default_config() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            bail!("workers must be at least 1 (got {})", self.workers);
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than 0");
        }
        if !matches!(self.default_format.to_ascii_lowercase().as_str(), "table" | "json") {
            bail!(
                "unknown default_format {:?} (expected table or json)",
                self.default_format
            );
        }
        Ok(())
    }

    /// HTTP client settings derived from this configuration.
    pub fn client_options(&self, token: Option<String>) -> ClientOptions {
        ClientOptions {
            base_url: self.api_base_url.clone(),
            token,
            timeout: Duration::from_secs(self.request_timeout_secs),
            retry: self.retry.policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_exact() {
        assert!(glob_match("alice", "alice"));
        assert!(!glob_match("alice", "alice2"));
    }

    #[test]
    fn test_glob_match_prefix_suffix() {
        assert!(glob_match("bot-*", "bot-"));
        assert!(glob_match("bot-*", "bot-renovate"));
        assert!(!glob_match("bot-*", "robot-x"));
        assert!(glob_match("*-archive", "acme/old-archive"));
        assert!(!glob_match("*-archive", "acme/archive-old"));
    }

    #[test]
    fn test_glob_match_contains() {
        assert!(glob_match("*hulud*", "shai-hulud-test"));
        assert!(glob_match("acme/*/x", "acme/a/b/x"));
        assert!(!glob_match("*hulud*", "dune"));
    }

    #[test]
    fn test_ignore_is_case_insensitive() {
        let ignore = IgnoreConfig {
            users: vec!["Dependabot*".to_string()],
            repositories: vec!["acme/Legacy-*".to_string()],
        };

        assert!(ignore.should_ignore_user("dependabot-preview"));
        assert!(!ignore.should_ignore_user("alice"));
        assert!(ignore.should_ignore_repository("ACME/legacy-api"));
        assert!(!ignore.should_ignore_repository("acme/api"));
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.workers, 5);
        assert_eq!(config.api_base_url, "https://api.github.com");
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.default_format, "table");
        assert!(config.rules_path.is_none());
        assert!(config.ignore.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_matches_policy_defaults() {
        let policy = RetryConfig::default().policy();
        let expected = RetryPolicy::default();

        assert_eq!(policy.rate_limit_attempts, expected.rate_limit_attempts);
        assert_eq!(policy.base_delay, expected.base_delay);
        assert_eq!(policy.max_delay, expected.max_delay);
        assert_eq!(policy.secondary_delay, expected.secondary_delay);
        assert_eq!(policy.max_reset_wait, expected.max_reset_wait);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            default_format: "sarif".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "workers = 8\n[ignore]\nusers = [\"bot-*\"]\n[retry]\nbase_delay_ms = 10\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.retry.base_delay_ms, 10);
        assert_eq!(config.retry.rate_limit_attempts, 5);
        assert!(config.ignore.should_ignore_user("bot-x"));

        let out = dir.path().join("nested").join("config.toml");
        config.save_to(&out).unwrap();
        assert_eq!(Config::load_from(&out).unwrap().workers, 8);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.workers, 5);
    }

    #[test]
    fn test_load_rejects_invalid_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "workers = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_client_options() {
        let config = Config {
            request_timeout_secs: 3,
            ..Config::default()
        };
        let options = config.client_options(Some("tok".to_string()));
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert_eq!(options.token.as_deref(), Some("tok"));
        assert_eq!(options.base_url, DEFAULT_API_URL);
    }
}
