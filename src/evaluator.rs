//! Runs one resolved task against the score store and correlation
//! engine.
//!
//! Per language pair the evaluator selects the items reachable through
//! the task's admissible references (minus close references), keeps
//! the metrics with complete coverage, pools scores across pairs in
//! pair order, and invokes the engine once. The result is sorted
//! descending by value (stable, so ties keep store discovery order)
//! and dense-ranked.

use std::collections::BTreeSet;

use tracing::debug;

use crate::engine::CorrelationEngine;
use crate::error::{EvalError, EvalResult};
use crate::result::{MetricEntry, TaskResult};
use crate::store::ScoreStore;
use crate::task::Task;

/// Evaluates tasks against a shared store and engine.
pub struct Evaluator<'a> {
    store: &'a dyn ScoreStore,
    engine: &'a dyn CorrelationEngine,
}

impl<'a> Evaluator<'a> {
    /// Borrow a store and an engine for the evaluator's lifetime.
    pub fn new(store: &'a dyn ScoreStore, engine: &'a dyn CorrelationEngine) -> Self {
        Self { store, engine }
    }

    /// Evaluate one task.
    ///
    /// Metrics missing scores for any required item are silently
    /// excluded; an empty qualifying set is
    /// [`EvalError::EmptyResult`], and engine failures are wrapped as
    /// [`EvalError::Evaluation`] with the task's attribute snapshot.
    pub fn run(&self, task: &Task) -> EvalResult<TaskResult> {
        let pairs = task.lang_pairs();

        // Per pair: the ordered kept item list and its gold vector.
        let mut pair_items: Vec<Vec<String>> = Vec::with_capacity(pairs.len());
        let mut gold_pooled: Vec<f64> = Vec::new();
        for (idx, pair) in pairs.iter().enumerate() {
            let gold_id = task.gold().at(idx);
            let gold_map = self
                .store
                .gold_scores(task.test_set(), pair, gold_id, task.level(), task.domain())
                .ok_or_else(|| EvalError::Evaluation {
                    task: task.to_string(),
                    message: format!(
                        "no '{gold_id}' gold scores for {}/{pair}",
                        task.test_set()
                    ),
                })?;

            let mut kept: BTreeSet<String> = BTreeSet::new();
            for ref_id in task.refs().at(idx) {
                kept.extend(self.store.items_for_ref(task.test_set(), pair, ref_id));
            }
            for ref_id in task.close_refs().at(idx) {
                for item in self.store.items_for_ref(task.test_set(), pair, ref_id) {
                    kept.remove(&item);
                }
            }
            // BTreeSet iteration gives a deterministic item order.
            let items: Vec<String> = kept
                .into_iter()
                .filter(|item| gold_map.contains_key(item))
                .collect();
            for item in &items {
                gold_pooled.push(gold_map[item]);
            }
            pair_items.push(items);
        }

        // Metric discovery order across pairs, then coverage filtering.
        let per_pair_tables: Vec<_> = pairs
            .iter()
            .map(|pair| {
                self.store
                    .metric_scores(task.test_set(), pair, task.level(), task.domain())
            })
            .collect();
        let mut order: Vec<&str> = Vec::new();
        for tables in &per_pair_tables {
            for (name, _) in tables {
                if !order.contains(&name.as_str()) {
                    order.push(name.as_str());
                }
            }
        }

        let mut names: Vec<String> = Vec::new();
        let mut score_vecs: Vec<Vec<f64>> = Vec::new();
        'metric: for name in order {
            let mut pooled: Vec<f64> = Vec::with_capacity(gold_pooled.len());
            for (tables, items) in per_pair_tables.iter().zip(&pair_items) {
                let Some((_, table)) = tables.iter().find(|(n, _)| n.as_str() == name) else {
                    continue 'metric;
                };
                for item in items {
                    match table.get(item) {
                        Some(score) => pooled.push(*score),
                        None => continue 'metric,
                    }
                }
            }
            names.push(name.to_string());
            score_vecs.push(pooled);
        }

        if names.is_empty() {
            return Err(EvalError::EmptyResult {
                task: task.to_string(),
            });
        }
        debug!(
            task = %task,
            metrics = names.len(),
            items = gold_pooled.len(),
            "evaluating task"
        );

        let out = self
            .engine
            .evaluate(&score_vecs, &gold_pooled, task.corr_fcn(), task.k())
            .map_err(|err| EvalError::Evaluation {
                task: task.to_string(),
                message: err.to_string(),
            })?;

        // Stable descending sort keeps discovery order for ties.
        let mut idxs: Vec<usize> = (0..names.len()).collect();
        idxs.sort_by(|&a, &b| out.values[b].total_cmp(&out.values[a]));
        let sorted_values: Vec<f64> = idxs.iter().map(|&i| out.values[i]).collect();
        let ranks = dense_ranks(&sorted_values);

        let entries: Vec<MetricEntry> = idxs
            .iter()
            .zip(&ranks)
            .map(|(&i, &rank)| MetricEntry {
                name: names[i].clone(),
                corr: out.values[i],
                rank,
            })
            .collect();
        let sig_matrix: Vec<Vec<Option<f64>>> = idxs
            .iter()
            .map(|&i| idxs.iter().map(|&j| out.sig_matrix[i][j]).collect())
            .collect();

        Ok(TaskResult::new(task.attr_vals(), entries, sig_matrix))
    }
}

/// Dense ranks for values already sorted descending: equal values
/// share a rank and the next distinct value gets the previous rank
/// plus one, so ranks have no gaps.
pub fn dense_ranks(sorted_desc: &[f64]) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(sorted_desc.len());
    let mut rank = 0usize;
    let mut prev: Option<f64> = None;
    for &value in sorted_desc {
        if prev != Some(value) {
            rank += 1;
            prev = Some(value);
        }
        ranks.push(rank);
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, EngineOutput, StatsEngine};
    use crate::schema::CorrFcn;
    use crate::store::fixtures::wmt_store;
    use crate::task::TaskSpec;

    fn run(spec: TaskSpec) -> EvalResult<TaskResult> {
        let store = wmt_store();
        let engine = StatsEngine::default();
        let task = Task::from_spec(spec)?;
        Evaluator::new(&store, &engine).run(&task)
    }

    #[test]
    fn test_dense_ranks() {
        assert_eq!(dense_ranks(&[0.9, 0.9, 0.5, 0.5, 0.1]), [1, 1, 2, 2, 3]);
        assert_eq!(dense_ranks(&[1.0]), [1]);
        assert_eq!(dense_ranks(&[]), Vec::<usize>::new());
    }

    #[test]
    fn test_run_default_task() {
        let res = run(TaskSpec::default()).unwrap();
        assert_eq!(
            res.metrics(),
            ["CometX", "PartialMetric", "BleuRef", "ChrFish"]
        );
        assert!((res.corr("CometX").unwrap() - 1.0).abs() < 1e-7);
        assert!((res.corr("PartialMetric").unwrap() - 0.8).abs() < 1e-7);
        assert!((res.corr("BleuRef").unwrap() - 0.6).abs() < 1e-7);
        assert!((res.corr("ChrFish").unwrap() + 1.0).abs() < 1e-7);
        assert_eq!(res.rank("CometX"), Some(1));
        assert_eq!(res.rank("ChrFish"), Some(4));
        // k defaults to 0: nothing is compared.
        assert!(res
            .sig_matrix()
            .iter()
            .all(|row| row.iter().all(Option::is_none)));
    }

    #[test]
    fn test_close_refs_are_excluded() {
        let res = run(TaskSpec {
            test_set: Some("wmt21.news".into()),
            ..TaskSpec::default()
        })
        .unwrap();
        assert_eq!(res.metrics(), ["CometX", "BleuRef"]);
        // sysd is only reachable through the close reference refB, so
        // CometX is scored on three systems: sqrt(27/28).
        assert!((res.corr("CometX").unwrap() - 0.9819805).abs() < 1e-7);
        assert_eq!(res.rank("CometX"), Some(1));
        assert!((res.corr("BleuRef").unwrap() + 1.0).abs() < 1e-7);
    }

    #[test]
    fn test_incomplete_coverage_is_silently_excluded() {
        let res = run(TaskSpec {
            lang: Some("en-de,en-ru".into()),
            ..TaskSpec::default()
        })
        .unwrap();
        // PartialMetric covers en-de only.
        assert_eq!(res.metrics(), ["CometX", "BleuRef", "ChrFish"]);
        assert!((res.corr("CometX").unwrap() - 1.0).abs() < 1e-7);
    }

    #[test]
    fn test_no_qualifying_metrics() {
        let err = run(TaskSpec {
            test_set: Some("wmt21.tedtalks".into()),
            ..TaskSpec::default()
        })
        .unwrap_err();
        assert!(matches!(err, EvalError::EmptyResult { .. }));
    }

    #[test]
    fn test_engine_failure_is_wrapped() {
        struct FailEngine;
        impl CorrelationEngine for FailEngine {
            fn evaluate(
                &self,
                _scores: &[Vec<f64>],
                gold: &[f64],
                _corr_fcn: CorrFcn,
                _k: usize,
            ) -> Result<EngineOutput, EngineError> {
                Err(EngineError::InsufficientData(gold.len()))
            }
        }

        let store = wmt_store();
        let task = Task::from_spec(TaskSpec::default()).unwrap();
        let err = Evaluator::new(&store, &FailEngine).run(&task).unwrap_err();
        match err {
            EvalError::Evaluation { task, .. } => assert!(task.contains("wmt22.news")),
            other => panic!("expected evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn test_tied_values_share_rank() {
        // CometX and its clone produce identical pooled vectors, so
        // they tie at rank 1 in discovery order.
        let mut store = wmt_store();
        store.add_metric(
            "wmt22.news",
            "en-de",
            "CometX-clone",
            &[("sysa", 2.0), ("sysb", 4.0), ("sysc", 6.0), ("sysd", 8.0)],
        );
        let engine = StatsEngine::default();
        let task = Task::from_spec(TaskSpec::default()).unwrap();
        let res = Evaluator::new(&store, &engine).run(&task).unwrap();
        assert_eq!(
            res.metrics(),
            ["CometX", "CometX-clone", "PartialMetric", "BleuRef", "ChrFish"]
        );
        assert_eq!(res.rank("CometX"), Some(1));
        assert_eq!(res.rank("CometX-clone"), Some(1));
        assert_eq!(res.rank("PartialMetric"), Some(2));
        assert_eq!(res.rank("ChrFish"), Some(4));
    }
}
