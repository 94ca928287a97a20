use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::registry::TrackerEntry;
use crate::scan::{DomainMetadata, RawScanResult};

/// Per-site record of the normalized dataset. Trackers are referenced by
/// dictionary key instead of embedded, and the raw resource list is gone,
/// this is the compact form analytics and persistence work from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedScanResult {
    pub requested_url: String,
    pub final_url: String,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default)]
    pub total_size: u64,
    #[serde(default)]
    pub tracker_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_metadata: Option<DomainMetadata>,
}

/// All per-site results cross-referenced against one shared tracker
/// dictionary. Every `tracker_domains` entry is a key of `all_trackers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDataset {
    pub generation_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub all_trackers: BTreeMap<String, TrackerEntry>,
    pub scan_results: Vec<NormalizedScanResult>,
}

/// Collapses raw per-site results into a [`NormalizedDataset`].
///
/// The dictionary entry stored for a tracker domain is the one attached the
/// first time that domain is seen; later sightings never overwrite it.
/// `rules` never crosses this boundary. `error` and `domainMetadata` pass
/// through unchanged.
pub fn normalize_results(
    results: &[RawScanResult],
    source_file: Option<&str>,
) -> NormalizedDataset {
    let mut all_trackers: BTreeMap<String, TrackerEntry> = BTreeMap::new();
    let mut scan_results = Vec::with_capacity(results.len());

    for result in results {
        let mut tracker_domains = Vec::with_capacity(result.trackers.len());
        for tracker in &result.trackers {
            tracker_domains.push(tracker.domain.clone());
            all_trackers
                .entry(tracker.domain.clone())
                .or_insert_with(|| tracker.info.without_rules());
        }

        scan_results.push(NormalizedScanResult {
            requested_url: result.requested_url.clone(),
            final_url: result.final_url.clone(),
            domain: result.domain.clone(),
            timestamp: result.timestamp,
            screenshot_path: result.screenshot_path.clone(),
            total_size: result.total_size,
            tracker_domains,
            error: result.error.clone(),
            domain_metadata: result.domain_metadata.clone(),
        });
    }

    info!(
        action = "complete",
        component = "normalize",
        site_count = scan_results.len(),
        tracker_count = all_trackers.len(),
        "Scan results normalized"
    );

    NormalizedDataset {
        generation_timestamp: Utc::now(),
        source_file: source_file.map(|s| s.to_string()),
        all_trackers,
        scan_results,
    }
}

pub fn save_dataset(path: &Path, dataset: &NormalizedDataset) -> Result<()> {
    let content = serde_json::to_string_pretty(dataset)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write normalized dataset {:?}", path))
}

pub fn load_dataset(path: &Path) -> Result<NormalizedDataset> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read normalized dataset {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Normalized dataset {:?} is not in the expected shape", path))
}
