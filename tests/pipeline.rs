// tests/pipeline.rs
//
// End-to-end run of the engine: registry -> index -> scan -> normalize ->
// aggregate, over fixture files in a temp directory, plus the analytics-only
// path over saved results and cache behavior across two runs.
//
use std::fs;
use std::path::Path;

use trackscope::scan::CaptureDirCollector;
use trackscope::{cache, normalize, scan, stats};
use trackscope::{TrackerIndex, TrackerRegistry};

fn write_fixtures(dir: &Path) {
    fs::write(
        dir.join("trackers.json"),
        r#"{
            "trackers": {
                "tracker-one.net": {
                    "owner": "Alpha Analytics",
                    "prevalence": 0.62,
                    "categories": ["Analytics"],
                    "rules": ["tracker-one\\.net/collect"]
                },
                "pixel.example": {
                    "owner": "Beta Ads",
                    "prevalence": 0.31,
                    "categories": ["Advertising", "Analytics"]
                }
            }
        }"#,
    )
    .unwrap();

    fs::write(
        dir.join("sites.json"),
        r#"[
            {"url": "https://news-site.com", "category": "News", "owner": {"country": "US"}},
            {"url": "shop-site.com"},
            {"url": "https://broken.site"}
        ]"#,
    )
    .unwrap();

    let captures = dir.join("captures");
    fs::create_dir(&captures).unwrap();
    fs::write(
        captures.join("news-site.com.json"),
        r#"{
            "finalUrl": "https://news-site.com/",
            "resourceUrls": [
                "https://a.tracker-one.net/collect.js",
                "https://b.tracker-one.net/beacon.gif",
                "https://pixel.example/p.gif",
                "https://static.news-site.com/app.js"
            ],
            "totalSize": 350000,
            "screenshotPath": "shots/news-site.com.png"
        }"#,
    )
    .unwrap();
    fs::write(
        captures.join("shop-site.com.json"),
        r#"{
            "finalUrl": "https://shop-site.com/",
            "resourceUrls": ["https://tracker-one.net/collect.js"],
            "totalSize": 120000
        }"#,
    )
    .unwrap();
    // broken.site deliberately has no capture manifest
}

#[test]
fn scan_normalize_aggregate_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    let registry = TrackerRegistry::load(&dir.path().join("trackers.json")).unwrap();
    assert_eq!(registry.len(), 2);
    let index = TrackerIndex::build(&registry);

    let sites = scan::load_sites(&dir.path().join("sites.json")).unwrap();
    let collector = CaptureDirCollector::new(dir.path().join("captures"));
    let cache_path = dir.path().join("scan_cache.json");

    let (results, ledger) = scan::scan_sites(
        &sites,
        &collector,
        &index,
        &registry,
        Vec::new(),
        Some(&cache_path),
    );

    assert_eq!(results.len(), 3);
    // Subdomains of one tracker collapse to one detection
    let news = &results[0];
    let news_trackers: Vec<&str> = news.trackers.iter().map(|t| t.domain.as_str()).collect();
    assert_eq!(news_trackers, vec!["tracker-one.net", "pixel.example"]);
    assert!(results[1].error.is_none());
    assert!(results[2].error.is_some());

    // The failed site stays retryable in the persisted ledger
    assert_eq!(ledger.len(), 3);
    let persisted = cache::load_ledger(&cache_path);
    assert!(cache::is_processed("news-site.com", &persisted));
    assert!(!cache::is_processed("broken.site", &persisted));

    let dataset = normalize::normalize_results(&results, None);
    assert_eq!(dataset.all_trackers.len(), 2);
    let serialized = serde_json::to_value(&dataset).unwrap();
    assert!(serialized["allTrackers"]["tracker-one.net"]
        .get("rules")
        .is_none());

    let report = stats::aggregate(&dataset).unwrap();
    assert_eq!(report.summary.total_sites, 3);
    assert_eq!(report.summary.sites_with_trackers, 2);
    assert_eq!(report.summary.sites_with_errors, 1);
    assert_eq!(report.summary.total_tracker_instances, 3);
    assert_eq!(report.summary.total_bytes_transferred, 470000);
    assert_eq!(report.summary.average_trackers_per_site, 1.0);
    assert_eq!(report.summary.unique_tracker_domains, 2);
    assert_eq!(report.summary.unique_tracker_owners, 2);

    assert_eq!(report.top_tracker_domains[0].name, "tracker-one.net");
    assert_eq!(report.top_tracker_domains[0].count, 2);
    assert_eq!(report.top_tracker_domains[0].percentage, 66.67);

    assert_eq!(report.by_site_category["News"].site_count, 1);
    assert_eq!(report.by_site_category["Unknown Category"].site_count, 2);
    assert_eq!(report.by_owner_country["US"].site_count, 1);
    assert_eq!(report.by_owner_country["Unknown Country"].site_count, 2);
}

#[test]
fn second_run_skips_cached_sites() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    let registry = TrackerRegistry::load(&dir.path().join("trackers.json")).unwrap();
    let index = TrackerIndex::build(&registry);
    let sites = scan::load_sites(&dir.path().join("sites.json")).unwrap();
    let collector = CaptureDirCollector::new(dir.path().join("captures"));
    let cache_path = dir.path().join("scan_cache.json");

    let (first, _) = scan::scan_sites(
        &sites,
        &collector,
        &index,
        &registry,
        Vec::new(),
        Some(&cache_path),
    );
    assert_eq!(first.len(), 3);

    // Only the failed site is attempted again
    let ledger = cache::load_ledger(&cache_path);
    let (second, _) = scan::scan_sites(
        &sites,
        &collector,
        &index,
        &registry,
        ledger,
        Some(&cache_path),
    );
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].domain, "broken.site");
}

#[test]
fn saved_results_feed_the_same_analytics_path() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    let registry = TrackerRegistry::load(&dir.path().join("trackers.json")).unwrap();
    let index = TrackerIndex::build(&registry);
    let sites = scan::load_sites(&dir.path().join("sites.json")).unwrap();
    let collector = CaptureDirCollector::new(dir.path().join("captures"));

    let (results, _) = scan::scan_sites(&sites, &collector, &index, &registry, Vec::new(), None);

    let raw_path = dir.path().join("raw_results.json");
    scan::save_results(&raw_path, &results).unwrap();

    // Later, analytics-only: reload and run the identical pipeline tail
    let reloaded = scan::load_results(&raw_path).unwrap();
    let dataset = normalize::normalize_results(&reloaded, Some("raw_results.json"));
    assert_eq!(dataset.source_file.as_deref(), Some("raw_results.json"));

    let live = stats::aggregate(&normalize::normalize_results(&results, None)).unwrap();
    let saved = stats::aggregate(&dataset).unwrap();
    assert_eq!(saved.summary.total_sites, live.summary.total_sites);
    assert_eq!(
        saved.summary.total_tracker_instances,
        live.summary.total_tracker_instances
    );
    assert_eq!(
        saved.top_tracker_domains.len(),
        live.top_tracker_domains.len()
    );

    let dataset_path = dir.path().join("results.json");
    normalize::save_dataset(&dataset_path, &dataset).unwrap();
    let report = stats::aggregate(&normalize::load_dataset(&dataset_path).unwrap()).unwrap();
    assert_eq!(report.summary.total_sites, 3);
}
