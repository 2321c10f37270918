//! Task grids, batch execution, and cross-task rank aggregation.
//!
//! A [`TaskSet`] is an ordered sequence of tasks, usually produced by
//! Cartesian expansion of an attribute grid. Running it yields
//! [`TaskSetResults`], index-aligned with the set, which supports
//! grouping by attribute value, hierarchical fair weighting, and
//! weighted average ranks across heterogeneous configurations.

use std::collections::HashMap;
use std::ops::{Add, AddAssign};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::CorrelationEngine;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::result::TaskResult;
use crate::schema::Attr;
use crate::store::ScoreStore;
use crate::task::{Task, TaskSpec};

/// Ordered attribute grid: one `(attribute, candidate values)` entry
/// per varied attribute. A `None` value leaves the attribute unset so
/// it resolves to its default.
pub type AttrGrid = Vec<(Attr, Vec<Option<String>>)>;

/// Ordered sequence of tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSet {
    /// The tasks, in expansion (or concatenation) order.
    pub tasks: Vec<Task>,
}

impl TaskSet {
    /// Create an empty task set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand an attribute grid into one task per element of the
    /// Cartesian product, in odometer order (the last listed attribute
    /// varies fastest). `overrides` supplies fixed values applied to
    /// every combination (e.g. a shared `k`); grid values win over
    /// overrides for the attributes they name.
    ///
    /// An empty grid, or a grid attribute with no candidate values,
    /// expands to an empty set.
    pub fn from_grid(grid: &AttrGrid, overrides: &TaskSpec) -> EvalResult<TaskSet> {
        if grid.is_empty() || grid.iter().any(|(_, values)| values.is_empty()) {
            return Ok(TaskSet::new());
        }

        let mut tasks = Vec::new();
        let mut combo = vec![0usize; grid.len()];
        'expand: loop {
            let mut spec = overrides.clone();
            for (&slot, (attr, values)) in combo.iter().zip(grid) {
                apply_attr(&mut spec, *attr, values[slot].clone())?;
            }
            tasks.push(Task::from_spec(spec)?);

            // Odometer increment, last position fastest.
            let mut pos = grid.len();
            loop {
                if pos == 0 {
                    break 'expand;
                }
                pos -= 1;
                combo[pos] += 1;
                if combo[pos] < grid[pos].1.len() {
                    continue 'expand;
                }
                combo[pos] = 0;
            }
        }
        Ok(TaskSet { tasks })
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when the set holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterate over the tasks in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    /// Run every task in order (strict mode: the first task failure
    /// aborts the batch, keeping results index-aligned with the set).
    pub fn run(
        &self,
        store: &dyn ScoreStore,
        engine: &dyn CorrelationEngine,
    ) -> EvalResult<TaskSetResults> {
        info!(tasks = self.len(), "running task set");
        let evaluator = Evaluator::new(store, engine);
        let results = self
            .tasks
            .iter()
            .map(|task| evaluator.run(task))
            .collect::<EvalResult<Vec<TaskResult>>>()?;
        Ok(TaskSetResults { results })
    }

    /// Run every task across the rayon pool. Results are collected in
    /// set order regardless of completion order, and the strict-mode
    /// failure semantics match [`TaskSet::run`].
    pub fn run_parallel(
        &self,
        store: &dyn ScoreStore,
        engine: &dyn CorrelationEngine,
    ) -> EvalResult<TaskSetResults> {
        info!(tasks = self.len(), "running task set in parallel");
        let evaluator = Evaluator::new(store, engine);
        let results = self
            .tasks
            .par_iter()
            .map(|task| evaluator.run(task))
            .collect::<EvalResult<Vec<TaskResult>>>()?;
        Ok(TaskSetResults { results })
    }
}

impl Add for TaskSet {
    type Output = TaskSet;

    /// Element-wise concatenation; no deduplication or reordering.
    fn add(mut self, rhs: TaskSet) -> TaskSet {
        self.tasks.extend(rhs.tasks);
        self
    }
}

impl AddAssign for TaskSet {
    fn add_assign(&mut self, rhs: TaskSet) {
        self.tasks.extend(rhs.tasks);
    }
}

fn apply_attr(spec: &mut TaskSpec, attr: Attr, value: Option<String>) -> EvalResult<()> {
    match attr {
        Attr::TestSet => spec.test_set = value,
        Attr::Lang => spec.lang = value,
        Attr::Domain => spec.domain = value,
        Attr::Level => spec.level = value,
        Attr::CorrFcn => spec.corr_fcn = value.map(|v| v.parse()).transpose()?,
        Attr::K => {
            spec.k = value
                .map(|v| {
                    v.parse::<usize>().map_err(|_| {
                        EvalError::Config(format!("invalid resampling count '{v}'"))
                    })
                })
                .transpose()?
        }
    }
    Ok(())
}

/// Results of running a task set, index-aligned with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSetResults {
    /// One result per task, in set order.
    pub results: Vec<TaskResult>,
}

impl TaskSetResults {
    /// Number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True when no results are present.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate over the results in order.
    pub fn iter(&self) -> std::slice::Iter<'_, TaskResult> {
        self.results.iter()
    }

    /// Partition results by the snapshot value of `attr`. Keys appear
    /// in first-seen order, and members keep their relative order.
    pub fn split_by_attr(&self, attr: Attr) -> Vec<(String, Vec<&TaskResult>)> {
        let mut splits: Vec<(String, Vec<&TaskResult>)> = Vec::new();
        for result in &self.results {
            let key = result.attr_val(attr);
            match splits.iter_mut().find(|(k, _)| k.as_str() == key) {
                Some((_, members)) => members.push(result),
                None => splits.push((key.to_string(), vec![result])),
            }
        }
        splits
    }

    /// Assign one weight per result, summing to 1 across the batch.
    ///
    /// Mass is split uniformly across the distinct observed values of
    /// the first attribute, then recursively within each value's
    /// subgroup over the remaining attributes; leaf groups split their
    /// mass equally. With no attributes every result gets `1/N`. This
    /// keeps a language pair (or any listed attribute value) from
    /// dominating just because more configurations were run for it;
    /// imbalance invisible to the listed attributes is not corrected.
    pub fn assign_weights(&self, attrs: &[Attr]) -> Vec<f64> {
        let mut weights = vec![0.0; self.results.len()];
        let idxs: Vec<usize> = (0..self.results.len()).collect();
        self.distribute(&idxs, attrs, 1.0, &mut weights);
        weights
    }

    fn distribute(&self, idxs: &[usize], attrs: &[Attr], mass: f64, out: &mut [f64]) {
        if idxs.is_empty() {
            return;
        }
        let Some((&attr, rest)) = attrs.split_first() else {
            let w = mass / idxs.len() as f64;
            for &i in idxs {
                out[i] = w;
            }
            return;
        };
        // Group by observed value, first-seen order.
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for &i in idxs {
            let key = self.results[i].attr_val(attr);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(i),
                None => groups.push((key, vec![i])),
            }
        }
        let share = mass / groups.len() as f64;
        for (_, members) in groups {
            self.distribute(&members, rest, share, out);
        }
    }

    /// Weighted mean dense rank per metric, ascending.
    ///
    /// Weights come from [`TaskSetResults::assign_weights`] over the
    /// full attribute schema. For each metric the weights of the
    /// results containing it are renormalized to sum to 1, so a metric
    /// absent from some results is not penalized with zero credit.
    /// Ties keep the metric discovery order across results.
    pub fn average_ranks(&self) -> Vec<(String, f64)> {
        let weights = self.assign_weights(Attr::all());

        let mut order: Vec<String> = Vec::new();
        let mut sums: HashMap<String, (f64, f64)> = HashMap::new();
        for (result, &weight) in self.results.iter().zip(&weights) {
            for entry in result.entries() {
                if !sums.contains_key(&entry.name) {
                    order.push(entry.name.clone());
                }
                let (weight_sum, rank_sum) = sums.entry(entry.name.clone()).or_insert((0.0, 0.0));
                *weight_sum += weight;
                *rank_sum += weight * entry.rank as f64;
            }
        }

        let mut ranked: Vec<(String, f64)> = order
            .into_iter()
            .map(|name| {
                let (weight_sum, rank_sum) = sums[&name];
                (name, rank_sum / weight_sum)
            })
            .collect();
        // Stable sort: ties keep discovery order.
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StatsEngine;
    use crate::schema::CorrFcn;
    use crate::store::fixtures::wmt_store;

    fn vals(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(String::from)).collect()
    }

    fn lang_grid(langs: &[&str]) -> AttrGrid {
        let values: Vec<Option<String>> = langs.iter().map(|l| Some((*l).to_string())).collect();
        vec![(Attr::Lang, values)]
    }

    /// Mixed task set mirrored across lang/corr_fcn, all at k = 1.
    fn mixed_results() -> TaskSetResults {
        let k1 = TaskSpec {
            k: Some(1),
            ..TaskSpec::default()
        };
        let mut set = TaskSet::from_grid(
            &lang_grid(&["en-de,en-ru,zh-en"]),
            &TaskSpec {
                corr_fcn: Some(CorrFcn::Accuracy),
                ..k1.clone()
            },
        )
        .unwrap();
        set += TaskSet::from_grid(
            &vec![
                (Attr::Lang, vals(&[Some("en-de"), Some("en-ru"), Some("zh-en")])),
                (Attr::CorrFcn, vals(&[Some("pearson")])),
            ],
            &k1,
        )
        .unwrap();
        set += TaskSet::from_grid(
            &vec![
                (Attr::Lang, vals(&[Some("en-de"), Some("en-ru")])),
                (Attr::CorrFcn, vals(&[Some("kendall")])),
            ],
            &k1,
        )
        .unwrap();
        set.run(&wmt_store(), &StatsEngine::default()).unwrap()
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn test_grid_expansion_counts() {
        let set = TaskSet::from_grid(
            &vec![
                (Attr::Lang, vals(&[Some("en-de"), Some("en-ru"), Some("zh-en")])),
                (
                    Attr::Domain,
                    vals(&[
                        None,
                        Some("conversation"),
                        Some("ecommerce"),
                        Some("news"),
                        Some("social"),
                    ]),
                ),
                (Attr::Level, vals(&[Some("sys"), Some("seg")])),
            ],
            &TaskSpec {
                k: Some(10),
                ..TaskSpec::default()
            },
        )
        .unwrap();
        assert_eq!(set.len(), 3 * 5 * 2);
        assert_eq!(set.iter().filter(|t| t.lang() == "en-de").count(), 10);
        assert_eq!(set.iter().filter(|t| t.k() == 10).count(), 30);
    }

    #[test]
    fn test_odometer_order() {
        let set = TaskSet::from_grid(
            &vec![
                (Attr::Lang, vals(&[Some("en-de"), Some("en-ru")])),
                (Attr::Level, vals(&[Some("sys"), Some("seg")])),
            ],
            &TaskSpec::default(),
        )
        .unwrap();
        let combos: Vec<(String, String)> = set
            .iter()
            .map(|t| (t.lang().to_string(), t.level().unwrap_or("").to_string()))
            .collect();
        assert_eq!(
            combos,
            [
                ("en-de".to_string(), "sys".to_string()),
                ("en-de".to_string(), "seg".to_string()),
                ("en-ru".to_string(), "sys".to_string()),
                ("en-ru".to_string(), "seg".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_grid() {
        let set = TaskSet::from_grid(&AttrGrid::new(), &TaskSpec::default()).unwrap();
        assert!(set.is_empty());

        let set = TaskSet::from_grid(&vec![(Attr::Lang, vec![])], &TaskSpec::default()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_bad_grid_value() {
        let err = TaskSet::from_grid(
            &vec![(Attr::K, vals(&[Some("ten")]))],
            &TaskSpec::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn test_concatenation_matches_combined_grid() {
        let sum = TaskSet::from_grid(&lang_grid(&["en-de"]), &TaskSpec::default()).unwrap()
            + TaskSet::from_grid(&lang_grid(&["en-ru"]), &TaskSpec::default()).unwrap()
            + TaskSet::from_grid(&lang_grid(&["zh-en"]), &TaskSpec::default()).unwrap();
        let all =
            TaskSet::from_grid(&lang_grid(&["en-de", "en-ru", "zh-en"]), &TaskSpec::default())
                .unwrap();
        assert_eq!(sum.tasks, all.tasks);
    }

    #[test]
    fn test_run_matches_individual_tasks() {
        let store = wmt_store();
        let engine = StatsEngine::default();
        let set = TaskSet::from_grid(
            &vec![(Attr::CorrFcn, vals(&[Some("pearson"), Some("accuracy")]))],
            &TaskSpec {
                k: Some(1),
                ..TaskSpec::default()
            },
        )
        .unwrap();
        let res = set.run(&store, &engine).unwrap();
        assert_eq!(res.len(), 2);

        let evaluator = Evaluator::new(&store, &engine);
        for (task, result) in set.iter().zip(res.iter()) {
            let reference = evaluator.run(task).unwrap();
            assert_eq!(result.metrics(), reference.metrics());
        }
        assert_eq!(res.results[0].attr_val(Attr::CorrFcn), "pearson");
        assert_eq!(res.results[1].attr_val(Attr::CorrFcn), "accuracy");
    }

    #[test]
    fn test_run_parallel_matches_serial() {
        let store = wmt_store();
        let engine = StatsEngine::default();
        let set = TaskSet::from_grid(
            &vec![
                (Attr::Lang, vals(&[Some("en-de"), Some("en-ru"), Some("zh-en")])),
                (Attr::CorrFcn, vals(&[Some("pearson"), Some("kendall")])),
            ],
            &TaskSpec {
                k: Some(5),
                ..TaskSpec::default()
            },
        )
        .unwrap();
        let serial = set.run(&store, &engine).unwrap();
        let parallel = set.run_parallel(&store, &engine).unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_split_by_attr() {
        let results = mixed_results();
        let splits = results.split_by_attr(Attr::Lang);
        let keys: Vec<&str> = splits.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["en-de,en-ru,zh-en", "en-de", "en-ru", "zh-en"]);
        let sizes: Vec<usize> = splits.iter().map(|(_, members)| members.len()).collect();
        assert_eq!(sizes, [1, 2, 2, 1]);
    }

    #[test]
    fn test_assign_weights_full_schema() {
        let results = mixed_results();
        let weights = results.assign_weights(Attr::all());
        assert_close(
            &weights,
            &[1.0 / 4.0, 1.0 / 8.0, 1.0 / 8.0, 1.0 / 4.0, 1.0 / 8.0, 1.0 / 8.0],
        );
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_assign_weights_single_attr() {
        let results = mixed_results();
        let weights = results.assign_weights(&[Attr::CorrFcn]);
        assert_close(
            &weights,
            &[1.0 / 3.0, 1.0 / 9.0, 1.0 / 9.0, 1.0 / 9.0, 1.0 / 6.0, 1.0 / 6.0],
        );

        // Every result shares the test set: one group, uniform split.
        let weights = results.assign_weights(&[Attr::TestSet]);
        assert_close(&weights, &[1.0 / 6.0; 6]);
    }

    #[test]
    fn test_assign_weights_no_attrs() {
        let results = mixed_results();
        let weights = results.assign_weights(&[]);
        assert_close(&weights, &[1.0 / 6.0; 6]);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_ranks() {
        let results = mixed_results();
        let ranks = results.average_ranks();
        let names: Vec<&str> = ranks.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["CometX", "PartialMetric", "BleuRef", "ChrFish"]);

        let values: Vec<f64> = ranks.iter().map(|(_, rank)| *rank).collect();
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(values, sorted);
        assert!(values.iter().all(|&r| r >= 1.0));

        // CometX wins every task outright.
        assert!((ranks[0].1 - 1.0).abs() < 1e-12);
        // PartialMetric only appears in the two en-de single-pair
        // results, at rank 2 in both; renormalization keeps it at 2.
        assert!((ranks[1].1 - 2.0).abs() < 1e-12);
    }
}
