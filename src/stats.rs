use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::normalize::NormalizedDataset;
use crate::utils::format_number;

const GLOBAL_TOP: usize = 20;
const GROUP_TOP_OWNERS: usize = 5;
const UNKNOWN_CATEGORY: &str = "Unknown Category";
const UNKNOWN_COUNTRY: &str = "Unknown Country";

/// One row of a ranked list: raw count plus its share of the ranking's
/// denominator (total sites for domain/owner rankings, total tracker
/// instances for category rankings).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    pub name: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerCountDistribution {
    pub mean: f64,
    pub median: f64,
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_sites: usize,
    pub sites_with_trackers: usize,
    pub sites_with_errors: usize,
    pub total_tracker_instances: usize,
    pub total_bytes_transferred: u64,
    pub average_trackers_per_site: f64,
    pub unique_tracker_domains: usize,
    pub unique_tracker_owners: usize,
}

/// Breakdown for one site category or owner country.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBreakdown {
    pub site_count: usize,
    pub tracker_instances: usize,
    pub top_owners: Vec<RankedItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub summary: ReportSummary,
    pub tracker_count_distribution: TrackerCountDistribution,
    pub top_tracker_domains: Vec<RankedItem>,
    pub top_owners: Vec<RankedItem>,
    pub top_categories: Vec<RankedItem>,
    pub by_site_category: BTreeMap<String, GroupBreakdown>,
    pub by_owner_country: BTreeMap<String, GroupBreakdown>,
}

/// Frequency of distinct referencing sites per name, in first-seen order.
/// Ranking sorts stably by count, so equal counts keep that order.
#[derive(Debug, Default)]
struct SiteTally {
    order: Vec<String>,
    sites: HashMap<String, HashSet<String>>,
}

impl SiteTally {
    fn add(&mut self, name: &str, site: &str) {
        if !self.sites.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.sites
            .entry(name.to_string())
            .or_default()
            .insert(site.to_string());
    }

    fn ranked(&self, top: usize, denominator: usize) -> Vec<RankedItem> {
        let counts = self
            .order
            .iter()
            .map(|name| (name.clone(), self.sites[name].len()));
        rank(counts, top, denominator)
    }
}

/// Plain occurrence counter, same ordering rules as [`SiteTally`].
#[derive(Debug, Default)]
struct InstanceTally {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl InstanceTally {
    fn bump(&mut self, name: &str) {
        if !self.counts.contains_key(name) {
            self.order.push(name.to_string());
        }
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    fn ranked(&self, top: usize, denominator: usize) -> Vec<RankedItem> {
        let counts = self
            .order
            .iter()
            .map(|name| (name.clone(), self.counts[name]));
        rank(counts, top, denominator)
    }
}

fn rank(
    counts: impl Iterator<Item = (String, usize)>,
    top: usize,
    denominator: usize,
) -> Vec<RankedItem> {
    let mut items: Vec<(String, usize)> = counts.collect();
    // sort_by is stable: ties keep insertion order
    items.sort_by(|a, b| b.1.cmp(&a.1));
    items
        .into_iter()
        .take(top)
        .map(|(name, count)| RankedItem {
            name,
            count,
            percentage: percentage_of(count, denominator),
        })
        .collect()
}

fn percentage_of(count: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round2(count as f64 * 100.0 / denominator as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn median_of(sorted: &[usize]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    }
}

#[derive(Debug, Default)]
struct GroupAccum {
    sites: HashSet<String>,
    instances: usize,
    owners: SiteTally,
}

/// Builds the full analytics report from a normalized dataset in one pass.
///
/// A dataset with no scan results is a hard error, there is nothing to
/// divide by. A site referencing a tracker domain missing from the
/// dictionary is logged and skipped, the aggregation continues.
pub fn aggregate(dataset: &NormalizedDataset) -> Result<AnalyticsReport> {
    let start_time = Instant::now();
    if dataset.scan_results.is_empty() {
        bail!("Cannot aggregate a dataset with zero scan results");
    }

    let total_sites = dataset.scan_results.len();
    let mut sites_with_trackers = 0usize;
    let mut sites_with_errors = 0usize;
    let mut total_instances = 0usize;
    let mut total_bytes = 0u64;
    let mut per_site_counts = Vec::with_capacity(total_sites);

    let mut domain_tally = SiteTally::default();
    let mut owner_tally = SiteTally::default();
    let mut category_tally = InstanceTally::default();
    let mut by_category: BTreeMap<String, GroupAccum> = BTreeMap::new();
    let mut by_country: BTreeMap<String, GroupAccum> = BTreeMap::new();

    for site in &dataset.scan_results {
        if site.error.is_some() {
            sites_with_errors += 1;
        }
        let references = site.tracker_domains.len();
        if references > 0 {
            sites_with_trackers += 1;
        }
        per_site_counts.push(references);
        total_instances += references;
        total_bytes += site.total_size;

        let metadata = site.domain_metadata.as_ref();
        let site_category = metadata
            .and_then(|m| m.category.as_deref())
            .unwrap_or(UNKNOWN_CATEGORY);
        let owner_country = metadata
            .and_then(|m| m.owner.as_ref())
            .and_then(|o| o.country.as_deref())
            .unwrap_or(UNKNOWN_COUNTRY);

        let category_group = by_category.entry(site_category.to_string()).or_default();
        category_group.sites.insert(site.domain.clone());
        category_group.instances += references;
        let country_group = by_country.entry(owner_country.to_string()).or_default();
        country_group.sites.insert(site.domain.clone());
        country_group.instances += references;

        for tracker_domain in &site.tracker_domains {
            let Some(entry) = dataset.all_trackers.get(tracker_domain) else {
                warn!(
                    action = "skip",
                    component = "aggregate",
                    site = %site.domain,
                    tracker = %tracker_domain,
                    "Tracker domain missing from dictionary, skipping reference"
                );
                continue;
            };

            domain_tally.add(tracker_domain, &site.domain);
            owner_tally.add(&entry.owner, &site.domain);
            for category in &entry.categories {
                category_tally.bump(category);
            }
            category_group.owners.add(&entry.owner, &site.domain);
            country_group.owners.add(&entry.owner, &site.domain);
        }
    }

    let unique_owners: HashSet<&str> = dataset
        .all_trackers
        .values()
        .map(|entry| entry.owner.as_str())
        .collect();

    let mean = round2(total_instances as f64 / total_sites as f64);
    per_site_counts.sort_unstable();
    let distribution = TrackerCountDistribution {
        mean,
        median: median_of(&per_site_counts),
        min: per_site_counts.first().copied().unwrap_or(0),
        max: per_site_counts.last().copied().unwrap_or(0),
    };

    let report = AnalyticsReport {
        summary: ReportSummary {
            total_sites,
            sites_with_trackers,
            sites_with_errors,
            total_tracker_instances: total_instances,
            total_bytes_transferred: total_bytes,
            average_trackers_per_site: mean,
            unique_tracker_domains: dataset.all_trackers.len(),
            unique_tracker_owners: unique_owners.len(),
        },
        tracker_count_distribution: distribution,
        top_tracker_domains: domain_tally.ranked(GLOBAL_TOP, total_sites),
        top_owners: owner_tally.ranked(GLOBAL_TOP, total_sites),
        top_categories: category_tally.ranked(GLOBAL_TOP, total_instances),
        by_site_category: finish_groups(by_category),
        by_owner_country: finish_groups(by_country),
    };

    let aggregate_time = start_time.elapsed();
    info!(
        action = "complete",
        component = "aggregate",
        site_count = total_sites,
        tracker_count = report.summary.unique_tracker_domains,
        duration_ms = aggregate_time.as_millis(),
        "Analytics aggregation completed"
    );
    Ok(report)
}

fn finish_groups(groups: BTreeMap<String, GroupAccum>) -> BTreeMap<String, GroupBreakdown> {
    groups
        .into_iter()
        .map(|(name, accum)| {
            let site_count = accum.sites.len();
            let breakdown = GroupBreakdown {
                site_count,
                tracker_instances: accum.instances,
                top_owners: accum.owners.ranked(GROUP_TOP_OWNERS, site_count),
            };
            (name, breakdown)
        })
        .collect()
}

pub fn save_report(path: &Path, report: &AnalyticsReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write analytics report {:?}", path))
}

/// Renders the report to stdout. `top` caps how many rows of each ranked
/// list get printed; the report itself always carries the full rankings.
pub fn print_report(report: &AnalyticsReport, top: usize) {
    let summary = &report.summary;

    println!("\n--- Tracker Scan Analysis ---");
    println!("Sites analyzed: {}", format_number(summary.total_sites as u64));
    println!(
        "Sites with trackers: {} | with errors: {}",
        format_number(summary.sites_with_trackers as u64),
        format_number(summary.sites_with_errors as u64)
    );
    println!(
        "Tracker instances: {} across {} unique domains ({} owners)",
        format_number(summary.total_tracker_instances as u64),
        format_number(summary.unique_tracker_domains as u64),
        format_number(summary.unique_tracker_owners as u64)
    );
    println!(
        "Bytes transferred: {}",
        format_number(summary.total_bytes_transferred)
    );

    let dist = &report.tracker_count_distribution;
    println!(
        "Trackers per site: mean {:.2}, median {}, min {}, max {}",
        dist.mean, dist.median, dist.min, dist.max
    );

    print_ranking("Top tracker domains (% of sites)", &report.top_tracker_domains, top);
    print_ranking("Top tracker owners (% of sites)", &report.top_owners, top);
    print_ranking("Top categories (% of instances)", &report.top_categories, top);

    print_groups("By site category", &report.by_site_category);
    print_groups("By owner country", &report.by_owner_country);
}

fn print_ranking(title: &str, items: &[RankedItem], top: usize) {
    if items.is_empty() {
        return;
    }
    println!("\n{}:", title);
    for item in items.iter().take(top) {
        println!(
            "- {}: {} ({:.2}%)",
            item.name,
            format_number(item.count as u64),
            item.percentage
        );
    }
}

fn print_groups(title: &str, groups: &BTreeMap<String, GroupBreakdown>) {
    if groups.is_empty() {
        return;
    }
    println!("\n{}:", title);
    for (name, group) in groups {
        println!(
            "- {}: {} sites, {} tracker instances",
            name,
            format_number(group.site_count as u64),
            format_number(group.tracker_instances as u64)
        );
        for owner in &group.top_owners {
            println!(
                "    {}: {} ({:.2}%)",
                owner.name,
                format_number(owner.count as u64),
                owner.percentage
            );
        }
    }
}
