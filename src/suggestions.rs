/// Person-name suggestions
///
/// Names are derived from the keys of the permanent bucket
/// (`{first}_{second}.{ext}`) and cached for a minute. Admin edits call
/// `invalidate()` so the next lookup sees them.
use crate::object_store::{Bucket, ObjectStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// How long a refreshed name list stays fresh
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Most suggestions returned for one query
pub const MAX_SUGGESTIONS: usize = 3;

/// Minimum similarity for a fuzzy match
const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Character-based edit distance
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// `1 - distance / len(name)`, compared in lowercase
fn similarity(query: &str, name: &str) -> f64 {
    let len = name.chars().count();
    if len == 0 {
        return 0.0;
    }
    1.0 - levenshtein(query, name) as f64 / len as f64
}

/// The two names encoded in an object key, in key order
pub fn names_from_key(key: &str) -> Vec<String> {
    let file = key.rsplit('/').next().unwrap_or(key);
    let mut parts = file.split('_');

    let first = parts.next().map(str::trim);
    let second = parts
        .next()
        .map(|part| part.split('.').next().unwrap_or(part).trim());

    [first, second]
        .into_iter()
        .flatten()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keep names in first-seen order, dropping repeats
fn collect_names(keys: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in keys.iter().flat_map(|key| names_from_key(key)) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Names matching `query`: substring or close spelling, at most three
pub fn match_names(names: &[String], query: &str) -> Vec<String> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    names
        .iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            lower.contains(&query) || similarity(&query, &lower) >= SIMILARITY_THRESHOLD
        })
        .take(MAX_SUGGESTIONS)
        .cloned()
        .collect()
}

pub struct SuggestionIndex {
    objects: Arc<dyn ObjectStore>,
    cache: RwLock<Option<(Vec<String>, Instant)>>,
    ttl: Duration,
}

impl SuggestionIndex {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self::with_ttl(objects, CACHE_TTL)
    }

    pub fn with_ttl(objects: Arc<dyn ObjectStore>, ttl: Duration) -> Self {
        Self {
            objects,
            cache: RwLock::new(None),
            ttl,
        }
    }

    /// Every known person name, refreshing from storage when stale
    pub async fn names(&self) -> Vec<String> {
        if let Some((names, refreshed)) = self.cache.read().await.as_ref() {
            if refreshed.elapsed() < self.ttl {
                return names.clone();
            }
        }

        let mut cache = self.cache.write().await;
        // Another request may have refreshed while we waited
        if let Some((names, refreshed)) = cache.as_ref() {
            if refreshed.elapsed() < self.ttl {
                return names.clone();
            }
        }

        match self.objects.list_objects(Bucket::Permanent, "").await {
            Ok(keys) => {
                let names = collect_names(&keys);
                tracing::debug!(count = names.len(), "Suggestion index refreshed");
                *cache = Some((names.clone(), Instant::now()));
                names
            }
            Err(e) => {
                tracing::error!("Failed to list images for suggestions: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn suggest(&self, query: &str) -> Vec<String> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        match_names(&self.names().await, query)
    }

    /// Drop the cached names; the next lookup lists storage again
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}
