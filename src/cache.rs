use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// One row of the scan ledger: whether a site domain has been processed and
/// how the last attempt went. Field names are stable, the file written by
/// one run is read back by the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub domain: String,
    pub last_checked: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// True iff the ledger records a successful scan of `domain`. A failed or
/// absent entry reads as "not yet processed", so the domain is retried on
/// the next run.
pub fn is_processed(domain: &str, ledger: &[CacheEntry]) -> bool {
    ledger
        .iter()
        .any(|entry| entry.domain == domain && entry.success)
}

/// Returns a new ledger with `entry` replacing any existing row for its
/// domain (keeping that row's position) or appended. The input ledger is
/// untouched, so earlier snapshots stay valid.
pub fn upsert(entry: CacheEntry, ledger: &[CacheEntry]) -> Vec<CacheEntry> {
    let mut updated = ledger.to_vec();
    match updated.iter().position(|e| e.domain == entry.domain) {
        Some(pos) => updated[pos] = entry,
        None => updated.push(entry),
    }
    updated
}

/// Reads a ledger file. Missing, empty, or malformed files all yield an
/// empty ledger so a run starts from scratch instead of aborting.
pub fn load_ledger(path: &Path) -> Vec<CacheEntry> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            info!(action = "start_empty", component = "cache_ledger", path = ?path, "No usable cache ledger, starting empty");
            return Vec::new();
        }
    };

    if content.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<CacheEntry>>(&content) {
        Ok(ledger) => {
            info!(
                action = "loaded",
                component = "cache_ledger",
                entry_count = ledger.len(),
                "Cache ledger loaded"
            );
            ledger
        }
        Err(e) => {
            warn!(action = "degrade", component = "cache_ledger", path = ?path, error = %e, "Malformed cache ledger, starting empty");
            Vec::new()
        }
    }
}

pub fn save_ledger(path: &Path, ledger: &[CacheEntry]) -> Result<()> {
    let content = serde_json::to_string_pretty(ledger)?;
    fs::write(path, content).with_context(|| format!("Failed to write cache ledger {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(domain: &str, success: bool) -> CacheEntry {
        CacheEntry {
            domain: domain.to_string(),
            last_checked: Utc::now(),
            success,
            error: if success {
                None
            } else {
                Some("navigation timeout".to_string())
            },
        }
    }

    #[test]
    fn only_successful_entries_count_as_processed() {
        let ledger = vec![entry("done.com", true), entry("failed.com", false)];
        assert!(is_processed("done.com", &ledger));
        assert!(!is_processed("failed.com", &ledger));
        assert!(!is_processed("never-seen.com", &ledger));
    }

    #[test]
    fn upsert_never_duplicates_a_domain() {
        let mut ledger = Vec::new();
        for domain in ["a.com", "b.com", "a.com", "c.com", "b.com"] {
            ledger = upsert(entry(domain, true), &ledger);
        }
        assert_eq!(ledger.len(), 3);

        let domains: Vec<&str> = ledger.iter().map(|e| e.domain.as_str()).collect();
        assert_eq!(domains, vec!["a.com", "b.com", "c.com"]);
    }

    #[test]
    fn upsert_replaces_in_place_and_preserves_snapshot() {
        let ledger = vec![entry("a.com", false), entry("b.com", true)];
        let updated = upsert(entry("a.com", true), &ledger);

        assert_eq!(updated[0].domain, "a.com");
        assert!(updated[0].success);
        // The previous snapshot still sees the failed attempt
        assert!(!ledger[0].success);
    }

    #[test]
    fn load_tolerates_missing_empty_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();

        assert!(load_ledger(&dir.path().join("missing.json")).is_empty());

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "").unwrap();
        assert!(load_ledger(&empty).is_empty());

        let malformed = dir.path().join("malformed.json");
        fs::write(&malformed, "{\"not\": \"a ledger\"}").unwrap();
        assert!(load_ledger(&malformed).is_empty());
    }

    #[test]
    fn ledger_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let ledger = vec![entry("a.com", true), entry("b.com", false)];
        save_ledger(&path, &ledger).unwrap();

        let loaded = load_ledger(&path);
        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].success);
        assert_eq!(loaded[1].error.as_deref(), Some("navigation timeout"));
    }
}
