use std::collections::HashMap;
use std::time::Instant;
use tracing::info;

use crate::domain::normalize_domain;
use crate::registry::{TrackerEntry, TrackerRegistry};

/// Trie over reversed domain labels (`sub.example.com` lives under
/// `com -> example -> sub`). A node is terminal when a registered tracker
/// domain ends there; `terminal` holds that domain's slot in the insertion
/// order so matching can honor it.
#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    terminal: Option<usize>,
}

/// Lookup structure derived from a [`TrackerRegistry`]: normalized domain ->
/// original registry key. Exact lookups are O(1) through a side table;
/// subdomain lookups walk the label trie, O(label count) instead of
/// O(registry size). When several registered domains are suffixes of one
/// observed domain, the earliest inserted wins — the same answer a linear
/// first-match scan over the registry in document order would give.
#[derive(Debug, Default)]
pub struct TrackerIndex {
    /// `(normalized, original key)` in registry document order.
    pairs: Vec<(String, String)>,
    exact: HashMap<String, usize>,
    root: TrieNode,
}

impl TrackerIndex {
    /// Builds the index in a single pass over the registry. Registry keys
    /// that normalize identically collapse onto one slot, last write wins.
    /// An empty registry yields an empty, fully usable index.
    pub fn build(registry: &TrackerRegistry) -> TrackerIndex {
        let start_time = Instant::now();

        let mut index = TrackerIndex::default();
        for (key, _) in registry.iter() {
            let normalized = normalize_domain(key);
            match index.exact.get(&normalized) {
                Some(&slot) => index.pairs[slot].1 = key.to_string(),
                None => {
                    let slot = index.pairs.len();
                    let mut node = &mut index.root;
                    for label in normalized.rsplit('.') {
                        node = node.children.entry(label.to_string()).or_default();
                    }
                    node.terminal = Some(slot);
                    index.exact.insert(normalized.clone(), slot);
                    index.pairs.push((normalized, key.to_string()));
                }
            }
        }

        let build_time = start_time.elapsed();
        info!(
            action = "complete",
            component = "tracker_index",
            indexed_count = index.pairs.len(),
            duration_ms = build_time.as_millis(),
            "Tracker index built"
        );
        index
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Resolves an observed request domain to a tracker registry entry.
    ///
    /// Tries an exact match on the normalized domain first, then looks for
    /// registered domains the observed one is a strict subdomain of. Ties
    /// between nested suffixes go to the earliest inserted registry key,
    /// not the most specific one.
    pub fn resolve<'r>(
        &self,
        observed_domain: &str,
        registry: &'r TrackerRegistry,
    ) -> Option<(&str, &'r TrackerEntry)> {
        let normalized = normalize_domain(observed_domain);
        if normalized.is_empty() {
            return None;
        }

        if let Some(&slot) = self.exact.get(&normalized) {
            let key = self.pairs[slot].1.as_str();
            return registry.get(key).map(|entry| (key, entry));
        }

        let labels: Vec<&str> = normalized.rsplit('.').collect();
        let mut best: Option<usize> = None;
        let mut node = &self.root;
        for (depth, label) in labels.iter().enumerate() {
            match node.children.get(*label) {
                Some(child) => node = child,
                None => break,
            }
            // A terminal consuming every label would be an exact match,
            // which already missed above; only strict suffixes count.
            if depth + 1 < labels.len() {
                if let Some(slot) = node.terminal {
                    best = Some(best.map_or(slot, |b| b.min(slot)));
                }
            }
        }

        let slot = best?;
        let key = self.pairs[slot].1.as_str();
        registry.get(key).map(|entry| (key, entry))
    }
}
