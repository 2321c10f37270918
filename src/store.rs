//! Score store seam.
//!
//! The evaluator reads submitted metric scores, gold human ratings, and
//! reference coverage through the [`ScoreStore`] trait; the crate never
//! loads raw score data from disk itself. [`MemoryScoreStore`] is the
//! in-memory implementation used by tests and by embedders that manage
//! their own loading.

use std::collections::{HashMap, HashSet};

/// Read-only provider of metric scores, gold ratings, and reference
/// coverage for benchmark collection slices.
///
/// Implementations must be `Sync`: batch runs share one store across
/// rayon workers.
pub trait ScoreStore: Sync {
    /// Submitted scores per metric for one `(test_set, lang_pair)`
    /// slice, in discovery order. Each entry maps item id (segment or
    /// system) to that metric's score. Discovery order is the
    /// tie-break order for equal correlation values, so it must be
    /// deterministic.
    fn metric_scores(
        &self,
        test_set: &str,
        lang_pair: &str,
        level: Option<&str>,
        domain: Option<&str>,
    ) -> Vec<(String, HashMap<String, f64>)>;

    /// Gold ratings from human-judgment source `gold`, item id to
    /// rating. `None` when the source is unavailable for the slice.
    fn gold_scores(
        &self,
        test_set: &str,
        lang_pair: &str,
        gold: &str,
        level: Option<&str>,
        domain: Option<&str>,
    ) -> Option<HashMap<String, f64>>;

    /// Item ids whose translations were produced against `ref_id`.
    fn items_for_ref(&self, test_set: &str, lang_pair: &str, ref_id: &str) -> HashSet<String>;
}

#[derive(Debug, Default)]
struct Slice {
    metrics: Vec<(String, HashMap<String, f64>)>,
    gold: HashMap<String, HashMap<String, f64>>,
    refs: HashMap<String, HashSet<String>>,
}

/// In-memory score store.
///
/// Holds one stratum per `(test_set, lang_pair)`; the level/domain
/// arguments of [`ScoreStore`] are accepted for trait compatibility
/// and do not further partition the data.
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    slices: HashMap<(String, String), Slice>,
}

impl MemoryScoreStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or extend) a metric's score table for one slice.
    pub fn add_metric(
        &mut self,
        test_set: &str,
        lang_pair: &str,
        metric: &str,
        scores: &[(&str, f64)],
    ) {
        let slice = self.slice_mut(test_set, lang_pair);
        let idx = match slice.metrics.iter().position(|(name, _)| name == metric) {
            Some(idx) => idx,
            None => {
                slice.metrics.push((metric.to_string(), HashMap::new()));
                slice.metrics.len() - 1
            }
        };
        let table = &mut slice.metrics[idx].1;
        for (item, score) in scores {
            table.insert((*item).to_string(), *score);
        }
    }

    /// Add gold ratings from one human-judgment source.
    pub fn add_gold(
        &mut self,
        test_set: &str,
        lang_pair: &str,
        gold: &str,
        scores: &[(&str, f64)],
    ) {
        let table = self
            .slice_mut(test_set, lang_pair)
            .gold
            .entry(gold.to_string())
            .or_default();
        for (item, score) in scores {
            table.insert((*item).to_string(), *score);
        }
    }

    /// Record which items were translated against a reference.
    pub fn add_ref(&mut self, test_set: &str, lang_pair: &str, ref_id: &str, items: &[&str]) {
        let set = self
            .slice_mut(test_set, lang_pair)
            .refs
            .entry(ref_id.to_string())
            .or_default();
        set.extend(items.iter().map(|i| (*i).to_string()));
    }

    fn slice_mut(&mut self, test_set: &str, lang_pair: &str) -> &mut Slice {
        self.slices
            .entry((test_set.to_string(), lang_pair.to_string()))
            .or_default()
    }

    fn slice(&self, test_set: &str, lang_pair: &str) -> Option<&Slice> {
        self.slices
            .get(&(test_set.to_string(), lang_pair.to_string()))
    }
}

impl ScoreStore for MemoryScoreStore {
    fn metric_scores(
        &self,
        test_set: &str,
        lang_pair: &str,
        _level: Option<&str>,
        _domain: Option<&str>,
    ) -> Vec<(String, HashMap<String, f64>)> {
        self.slice(test_set, lang_pair)
            .map(|s| s.metrics.clone())
            .unwrap_or_default()
    }

    fn gold_scores(
        &self,
        test_set: &str,
        lang_pair: &str,
        gold: &str,
        _level: Option<&str>,
        _domain: Option<&str>,
    ) -> Option<HashMap<String, f64>> {
        self.slice(test_set, lang_pair)
            .and_then(|s| s.gold.get(gold).cloned())
    }

    fn items_for_ref(&self, test_set: &str, lang_pair: &str, ref_id: &str) -> HashSet<String> {
        self.slice(test_set, lang_pair)
            .and_then(|s| s.refs.get(ref_id).cloned())
            .unwrap_or_default()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_order_is_insertion_order() {
        let store = fixtures::wmt_store();
        let names: Vec<String> = store
            .metric_scores("wmt22.news", "en-de", Some("sys"), None)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["CometX", "BleuRef", "ChrFish", "PartialMetric"]);
    }

    #[test]
    fn test_missing_slice_is_empty() {
        let store = MemoryScoreStore::new();
        assert!(store.metric_scores("x", "en-de", None, None).is_empty());
        assert!(store.gold_scores("x", "en-de", "mqm", None, None).is_none());
        assert!(store.items_for_ref("x", "en-de", "refA").is_empty());
    }

    #[test]
    fn test_add_metric_extends_existing_table() {
        let mut store = MemoryScoreStore::new();
        store.add_metric("t", "en-de", "m", &[("sysa", 1.0)]);
        store.add_metric("t", "en-de", "m", &[("sysb", 2.0)]);
        let tables = store.metric_scores("t", "en-de", None, None);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].1.len(), 2);
    }
}
