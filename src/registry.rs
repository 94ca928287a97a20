use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// One entry of the tracker registry. The registry key (a domain string) is
/// not stored on the entry itself. Attributes the engine does not model are
/// kept in `extra` rather than dropped, so a registry round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerEntry {
    pub owner: String,
    #[serde(default)]
    pub prevalence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Matching rules from upstream registries. Tolerated on input, never
    /// written to normalized output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrackerEntry {
    /// Copy of this entry with the `rules` attribute removed.
    pub fn without_rules(&self) -> TrackerEntry {
        TrackerEntry {
            rules: None,
            ..self.clone()
        }
    }
}

/// The loaded tracker registry: domain key -> entry, in authored document
/// order. Read-only after construction; matching semantics downstream depend
/// on the key order, so it is preserved here rather than left to a hash map.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    entries: Vec<(String, TrackerEntry)>,
    by_key: HashMap<String, usize>,
}

impl TrackerRegistry {
    pub fn from_trackers(trackers: Vec<(String, TrackerEntry)>) -> TrackerRegistry {
        let mut registry = TrackerRegistry::default();
        for (key, entry) in trackers {
            registry.insert(key, entry);
        }
        registry
    }

    fn insert(&mut self, key: String, entry: TrackerEntry) {
        match self.by_key.get(&key) {
            Some(&pos) => self.entries[pos] = (key, entry),
            None => {
                self.by_key.insert(key.clone(), self.entries.len());
                self.entries.push((key, entry));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&TrackerEntry> {
        self.by_key.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in authored document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TrackerEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Loads a registry document. An unreadable or syntactically invalid
    /// file is a hard error; a readable document whose `trackers` value is
    /// missing or not an object loads as an empty registry instead of
    /// failing the run. Individual entries that don't deserialize are
    /// skipped. The caller decides whether an empty registry is fatal.
    pub fn load(path: &Path) -> Result<TrackerRegistry> {
        let start_time = Instant::now();
        info!(action = "start", component = "registry_load", path = ?path, "Loading tracker registry");

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read tracker registry {:?}", path))?;
        let document: Value = serde_json::from_str(&content)
            .with_context(|| format!("Tracker registry {:?} is not valid JSON", path))?;

        let mut registry = TrackerRegistry::default();
        match document.get("trackers") {
            Some(Value::Object(trackers)) => {
                for (key, raw) in trackers {
                    match serde_json::from_value::<TrackerEntry>(raw.clone()) {
                        Ok(entry) => registry.insert(key.clone(), entry),
                        Err(e) => {
                            warn!(action = "skip", component = "registry_load", tracker = %key, error = %e, "Skipping malformed tracker entry")
                        }
                    }
                }
            }
            other => {
                warn!(
                    action = "degrade",
                    component = "registry_load",
                    found = other.map(value_kind).unwrap_or("missing"),
                    "Registry has no usable trackers object, continuing with an empty registry"
                );
            }
        }

        let load_time = start_time.elapsed();
        info!(
            action = "complete",
            component = "registry_load",
            tracker_count = registry.len(),
            duration_ms = load_time.as_millis(),
            "Tracker registry loaded"
        );
        Ok(registry)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
