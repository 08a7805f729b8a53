use crate::error::ScanError;
use serde::{Deserialize, Serialize};

/// Longest login GitHub accepts.
const MAX_LOGIN_LEN: usize = 39;

/// A GitHub login queued for scanning.
///
/// Logins are compared case-insensitively by GitHub, so [`ScanTarget::key`]
/// is what deduplication uses; the original spelling is kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanTarget(String);

impl ScanTarget {
    /// Validates `login` against GitHub's username charset: ASCII letters,
    /// digits and hyphens, not starting with a hyphen, at most 39 chars.
    pub fn parse(login: &str) -> Result<Self, ScanError> {
        let login = login.trim();
        let valid = !login.is_empty()
            && login.len() <= MAX_LOGIN_LEN
            && !login.starts_with('-')
            && login.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

        if valid {
            Ok(Self(login.to_string()))
        } else {
            Err(ScanError::InvalidUsername(login.to_string()))
        }
    }

    pub fn login(&self) -> &str {
        &self.0
    }

    pub fn key(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl AsRef<str> for ScanTarget {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_logins() {
        assert_eq!(ScanTarget::parse("alice").unwrap().login(), "alice");
        assert_eq!(ScanTarget::parse("  bob-42 ").unwrap().login(), "bob-42");
        assert!(ScanTarget::parse(&"a".repeat(39)).is_ok());
    }

    #[test]
    fn test_parse_rejects_bad_logins() {
        for bad in ["", "   ", "-alice", "al ice", "alice/repo", "ali_ce", "ünï"] {
            assert!(
                matches!(ScanTarget::parse(bad), Err(ScanError::InvalidUsername(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(ScanTarget::parse(&"a".repeat(40)).is_err());
    }

    #[test]
    fn test_key_is_case_insensitive() {
        let upper = ScanTarget::parse("Alice").unwrap();
        let lower = ScanTarget::parse("alice").unwrap();
        assert_ne!(upper, lower);
        assert_eq!(upper.key(), lower.key());
        assert_eq!(upper.to_string(), "Alice");
    }
}
