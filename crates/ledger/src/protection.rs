use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

/// Operator-maintained denylist of symbols the agent must never sell,
/// regardless of how many shares its ledger says it holds.
///
/// The file is a JSON object keyed by broker type; each value is either an
/// object whose keys are symbols or a plain array of symbols. Every lookup
/// re-reads the file so operator edits take effect immediately. This check
/// fails open: a missing file, unparseable content, or missing broker key
/// all mean "not protected" — the quantity check in `can_sell` is the
/// fail-closed side.
#[derive(Debug, Clone, Default)]
pub struct ProtectionList {
    path: Option<PathBuf>,
}

impl ProtectionList {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()) }
    }

    /// No protection list configured; nothing is ever protected.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn is_protected(&self, broker_type: &str, symbol: &str) -> bool {
        let Some(path) = self.path.as_deref() else {
            return false;
        };
        match Self::lookup(path, broker_type, symbol) {
            Some(hit) => hit,
            None => {
                debug!(path = %path.display(), "protection list unreadable, treating as unprotected");
                false
            }
        }
    }

    fn lookup(path: &Path, broker_type: &str, symbol: &str) -> Option<bool> {
        let raw = std::fs::read_to_string(path).ok()?;
        let data: Value = serde_json::from_str(&raw).ok()?;
        let hit = match data.get(broker_type) {
            Some(Value::Object(map)) => map.contains_key(symbol),
            Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(symbol)),
            _ => false,
        };
        Some(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protected.json");
        std::fs::write(&path, r#"{"futu": {"AAPL": true, "TSLA": 1}}"#).unwrap();

        let list = ProtectionList::from_path(&path);
        assert!(list.is_protected("futu", "AAPL"));
        assert!(list.is_protected("futu", "TSLA"));
        assert!(!list.is_protected("futu", "NVDA"));
        assert!(!list.is_protected("qmt", "AAPL"));
    }

    #[test]
    fn test_array_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protected.json");
        std::fs::write(&path, r#"{"qmt": ["600519.SH"]}"#).unwrap();

        let list = ProtectionList::from_path(&path);
        assert!(list.is_protected("qmt", "600519.SH"));
        assert!(!list.is_protected("qmt", "000001.SZ"));
    }

    #[test]
    fn test_fail_open() {
        // Missing file
        let list = ProtectionList::from_path("/nonexistent/protected.json");
        assert!(!list.is_protected("futu", "AAPL"));

        // Unparseable content
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protected.json");
        std::fs::write(&path, "{not json").unwrap();
        let list = ProtectionList::from_path(&path);
        assert!(!list.is_protected("futu", "AAPL"));

        // No list configured at all
        assert!(!ProtectionList::disabled().is_protected("futu", "AAPL"));
    }
}
