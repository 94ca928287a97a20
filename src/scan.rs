use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::cache::{self, CacheEntry};
use crate::domain::{host_of, normalize_domain};
use crate::index::TrackerIndex;
use crate::registry::{TrackerEntry, TrackerRegistry};

/// What the page collector hands back for one site: everything the page
/// loaded, how big it was, and whether navigation failed along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCapture {
    pub final_url: String,
    #[serde(default)]
    pub resource_urls: Vec<String>,
    #[serde(default)]
    pub total_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The page collection boundary. The engine only needs something that turns
/// a URL into a [`PageCapture`]; how pages actually get loaded (a browser, a
/// replay directory, a test stub) is the implementor's business.
pub trait PageCollector {
    fn collect(&self, url: &str) -> Result<PageCapture>;
}

/// Replays capture manifests recorded by an earlier collection run: one
/// `<normalized-domain>.json` file per site.
pub struct CaptureDirCollector {
    dir: PathBuf,
}

impl CaptureDirCollector {
    pub fn new(dir: impl Into<PathBuf>) -> CaptureDirCollector {
        CaptureDirCollector { dir: dir.into() }
    }
}

impl PageCollector for CaptureDirCollector {
    fn collect(&self, url: &str) -> Result<PageCapture> {
        let domain =
            site_domain(url).with_context(|| format!("No domain in site URL '{}'", url))?;
        let path = self.dir.join(format!("{}.json", domain));
        let content = fs::read_to_string(&path)
            .with_context(|| format!("No capture manifest at {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Malformed capture manifest {:?}", path))
    }
}

/// Declared ownership of a scanned site, carried through from the sites
/// file to the final report untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteOwner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<SiteOwner>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DomainMetadata {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.owner.is_none() && self.extra.is_empty()
    }
}

/// One line of the sites file: the URL to scan plus whatever metadata the
/// list declares about the site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSpec {
    pub url: String,
    #[serde(flatten)]
    pub metadata: DomainMetadata,
}

/// A tracker spotted on one page: the registry key it matched and the full
/// registry entry at time of scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedTracker {
    pub domain: String,
    pub info: TrackerEntry,
}

/// Complete record of one site scan. Built once when the scan finishes and
/// never touched again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScanResult {
    pub requested_url: String,
    pub final_url: String,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default)]
    pub total_size: u64,
    #[serde(default)]
    pub resource_urls: Vec<String>,
    #[serde(default)]
    pub trackers: Vec<DetectedTracker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_metadata: Option<DomainMetadata>,
}

/// Normalized domain of a site URL. Sites files usually list bare domains,
/// so a scheme is prepended when plain parsing finds no host.
pub fn site_domain(url: &str) -> Option<String> {
    host_of(url)
        .or_else(|| host_of(&format!("https://{}", url)))
        .map(|host| normalize_domain(&host))
        .filter(|domain| !domain.is_empty())
}

/// Scans one site: collect the page, resolve every loaded resource domain
/// against the tracker index, and record the distinct trackers found.
/// Collection failures land in the result's `error` field rather than
/// propagating, so one broken site never aborts a batch.
pub fn scan_site(
    site: &SiteSpec,
    collector: &dyn PageCollector,
    index: &TrackerIndex,
    registry: &TrackerRegistry,
) -> RawScanResult {
    let start_time = Instant::now();
    let domain = site_domain(&site.url).unwrap_or_default();
    let metadata = if site.metadata.is_empty() {
        None
    } else {
        Some(site.metadata.clone())
    };

    let capture = match collector.collect(&site.url) {
        Ok(capture) => capture,
        Err(e) => {
            warn!(action = "collect", component = "scan", site = %domain, error = %e, "Page collection failed");
            return RawScanResult {
                requested_url: site.url.clone(),
                final_url: site.url.clone(),
                domain,
                timestamp: Utc::now(),
                screenshot_path: None,
                total_size: 0,
                resource_urls: Vec::new(),
                trackers: Vec::new(),
                error: Some(e.to_string()),
                domain_metadata: metadata,
            };
        }
    };

    // Distinct per page: several subdomains of one tracker key count once.
    let mut trackers: Vec<DetectedTracker> = Vec::new();
    for resource_url in &capture.resource_urls {
        let Some(host) = host_of(resource_url) else {
            continue;
        };
        if let Some((key, entry)) = index.resolve(&host, registry) {
            if !trackers.iter().any(|t| t.domain == key) {
                trackers.push(DetectedTracker {
                    domain: key.to_string(),
                    info: entry.clone(),
                });
            }
        }
    }

    let scan_time = start_time.elapsed();
    info!(
        action = "complete",
        component = "scan",
        site = %domain,
        resource_count = capture.resource_urls.len(),
        tracker_count = trackers.len(),
        duration_ms = scan_time.as_millis(),
        "Site scan completed"
    );

    RawScanResult {
        requested_url: site.url.clone(),
        final_url: capture.final_url,
        domain,
        timestamp: Utc::now(),
        screenshot_path: capture.screenshot_path,
        total_size: capture.total_size,
        resource_urls: capture.resource_urls,
        trackers,
        error: capture.error,
        domain_metadata: metadata,
    }
}

/// Runs the whole batch, strictly one site at a time in the given order.
/// Sites already marked successful in the ledger are skipped; every attempt
/// upserts a fresh ledger entry, persisted after each site when a path is
/// given so an interrupted run resumes where it stopped.
pub fn scan_sites(
    sites: &[SiteSpec],
    collector: &dyn PageCollector,
    index: &TrackerIndex,
    registry: &TrackerRegistry,
    ledger: Vec<CacheEntry>,
    cache_path: Option<&Path>,
) -> (Vec<RawScanResult>, Vec<CacheEntry>) {
    let start_time = Instant::now();
    info!(
        action = "start",
        component = "scan_batch",
        site_count = sites.len(),
        "Starting site scans"
    );

    let mut ledger = ledger;
    let mut results = Vec::new();
    let mut skipped = 0usize;

    for site in sites {
        let domain = site_domain(&site.url).unwrap_or_default();
        if cache::is_processed(&domain, &ledger) {
            info!(action = "skip", component = "scan_batch", site = %domain, "Already processed, skipping");
            skipped += 1;
            continue;
        }

        let result = scan_site(site, collector, index, registry);
        ledger = cache::upsert(
            CacheEntry {
                domain: result.domain.clone(),
                last_checked: result.timestamp,
                success: result.error.is_none(),
                error: result.error.clone(),
            },
            &ledger,
        );
        if let Some(path) = cache_path {
            if let Err(e) = cache::save_ledger(path, &ledger) {
                warn!(action = "save", component = "cache_ledger", error = %e, "Failed to persist cache ledger");
            }
        }
        results.push(result);
    }

    let batch_time = start_time.elapsed();
    info!(
        action = "complete",
        component = "scan_batch",
        scanned = results.len(),
        skipped,
        duration_ms = batch_time.as_millis(),
        "Site scans completed"
    );
    (results, ledger)
}

/// Loads the sites file: a JSON array of site specs. Unlike the registry
/// and the ledger there is no graceful fallback here, a run without sites
/// has nothing to do.
pub fn load_sites(path: &Path) -> Result<Vec<SiteSpec>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read sites file {:?}", path))?;
    let sites: Vec<SiteSpec> = serde_json::from_str(&content)
        .with_context(|| format!("Sites file {:?} is not a JSON array of sites", path))?;
    info!(
        action = "loaded",
        component = "sites",
        site_count = sites.len(),
        "Sites file loaded"
    );
    Ok(sites)
}

/// Reads back a previously saved raw results file for analytics-only runs.
pub fn load_results(path: &Path) -> Result<Vec<RawScanResult>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scan results {:?}", path))?;
    let results: Vec<RawScanResult> = serde_json::from_str(&content)
        .with_context(|| format!("Scan results {:?} are not in the expected shape", path))?;
    info!(
        action = "loaded",
        component = "scan_results",
        result_count = results.len(),
        "Saved scan results loaded"
    );
    Ok(results)
}

pub fn save_results(path: &Path, results: &[RawScanResult]) -> Result<()> {
    let content = serde_json::to_string_pretty(results)?;
    fs::write(path, content).with_context(|| format!("Failed to write scan results {:?}", path))
}
