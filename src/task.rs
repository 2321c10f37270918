//! Task configuration and normalization.
//!
//! A [`TaskSpec`] is a partially specified evaluation request; building
//! a [`Task`] from it is a single atomic step that resolves schema
//! defaults, looks up gold/reference standards per language pair, and
//! validates field shapes. A `Task` is immutable once built, and two
//! tasks compare equal whenever every resolved field matches, so a
//! defaulted task equals its fully explicit spelling.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};
use crate::schema::{self, Attr, CorrFcn};

/// Set of reference translation identifiers.
pub type RefSet = BTreeSet<String>;

/// Per-language-pair value.
///
/// Single-pair tasks carry scalars, pooled multi-pair tasks carry one
/// value per pair in pair order. Downstream code pattern-matches on
/// the variant instead of inspecting runtime shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerPair<T> {
    /// One value for a single-pair task.
    Single(T),
    /// One value per language pair, parallel to the pair list.
    Multi(Vec<T>),
}

impl<T> PerPair<T> {
    /// Number of per-pair values.
    pub fn len(&self) -> usize {
        match self {
            PerPair::Single(_) => 1,
            PerPair::Multi(vs) => vs.len(),
        }
    }

    /// True when no values are present (empty `Multi`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value for pair index `idx`.
    ///
    /// Panics when `idx >= len()`; task construction guarantees the
    /// length matches the task's pair list.
    pub fn at(&self, idx: usize) -> &T {
        match self {
            PerPair::Single(v) => {
                debug_assert_eq!(idx, 0);
                v
            }
            PerPair::Multi(vs) => &vs[idx],
        }
    }
}

/// Build a [`RefSet`] from string-ish identifiers.
pub fn ref_set<I, S>(ids: I) -> RefSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(Into::into).collect()
}

/// Partially specified evaluation request.
///
/// Every field is optional; unset fields resolve to schema defaults
/// (or to the standards table for `gold`/`refs`/`close_refs`) when the
/// task is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Benchmark collection; defaults to `wmt22.news`.
    pub test_set: Option<String>,
    /// Language pair or comma-joined pair list; defaults to `en-de`.
    pub lang: Option<String>,
    /// Text domain stratification; `None` means all domains.
    pub domain: Option<String>,
    /// Scoring granularity; defaults to `sys`.
    pub level: Option<String>,
    /// Correlation statistic; defaults to Pearson.
    pub corr_fcn: Option<CorrFcn>,
    /// Resampling iterations; defaults to 0 (no significance testing).
    pub k: Option<usize>,
    /// Explicit gold source(s), bypassing the standards lookup.
    pub gold: Option<PerPair<String>>,
    /// Explicit admissible reference set(s).
    pub refs: Option<PerPair<RefSet>>,
    /// Explicit excluded close-reference set(s).
    pub close_refs: Option<PerPair<RefSet>>,
}

/// One fully resolved evaluation configuration.
///
/// Built by [`Task::from_spec`]; immutable afterwards. The invariant
/// that `gold`/`refs`/`close_refs` are `Single` for one language pair
/// and `Multi` of matching length otherwise is established at
/// construction and holds for the task's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    test_set: String,
    lang: String,
    domain: Option<String>,
    level: Option<String>,
    corr_fcn: CorrFcn,
    k: usize,
    gold: PerPair<String>,
    refs: PerPair<RefSet>,
    close_refs: PerPair<RefSet>,
}

impl Task {
    /// Build a task from a spec, resolving defaults and validating
    /// shapes. Never returns a partially initialized task.
    pub fn from_spec(spec: TaskSpec) -> EvalResult<Task> {
        let test_set = spec
            .test_set
            .unwrap_or_else(|| schema::DEFAULT_TEST_SET.to_string());
        let lang = spec.lang.unwrap_or_else(|| schema::DEFAULT_LANG.to_string());

        let pairs: Vec<&str> = lang.split(',').collect();
        if pairs.iter().any(|p| p.is_empty()) {
            return Err(EvalError::Config(format!(
                "empty language pair in lang '{lang}'"
            )));
        }
        let n_pairs = pairs.len();

        // Standards are looked up only for fields the caller left unset.
        let need_lookup =
            spec.gold.is_none() || spec.refs.is_none() || spec.close_refs.is_none();
        let standards = if need_lookup {
            let mut resolved = Vec::with_capacity(n_pairs);
            for pair in &pairs {
                let std = schema::standard(&test_set, pair).ok_or_else(|| {
                    EvalError::Config(format!(
                        "no gold/reference standard for test set '{test_set}' \
                         and language pair '{pair}'"
                    ))
                })?;
                resolved.push(std);
            }
            resolved
        } else {
            Vec::new()
        };

        let gold = match spec.gold {
            Some(g) => check_shape(g, n_pairs, "gold")?,
            None => per_pair(
                standards.iter().map(|s| s.gold.to_string()).collect(),
            ),
        };
        let refs = match spec.refs {
            Some(r) => check_shape(r, n_pairs, "refs")?,
            None => per_pair(
                standards
                    .iter()
                    .map(|s| ref_set(s.refs.iter().copied()))
                    .collect(),
            ),
        };
        let close_refs = match spec.close_refs {
            Some(c) => check_shape(c, n_pairs, "close_refs")?,
            None => per_pair(
                standards
                    .iter()
                    .map(|s| ref_set(s.close_refs.iter().copied()))
                    .collect(),
            ),
        };

        Ok(Task {
            test_set,
            lang,
            domain: spec.domain,
            level: spec
                .level
                .or_else(|| Some(schema::DEFAULT_LEVEL.to_string())),
            corr_fcn: spec.corr_fcn.unwrap_or_default(),
            k: spec.k.unwrap_or(0),
            gold,
            refs,
            close_refs,
        })
    }

    /// Benchmark collection identifier.
    pub fn test_set(&self) -> &str {
        &self.test_set
    }

    /// Language attribute as given (possibly comma-joined).
    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// Ordered language pair list.
    pub fn lang_pairs(&self) -> Vec<&str> {
        self.lang.split(',').collect()
    }

    /// Domain stratification, if any.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Scoring granularity.
    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    /// Correlation statistic.
    pub fn corr_fcn(&self) -> CorrFcn {
        self.corr_fcn
    }

    /// Resampling iteration count; 0 disables significance testing.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Resolved gold source(s).
    pub fn gold(&self) -> &PerPair<String> {
        &self.gold
    }

    /// Resolved admissible reference set(s).
    pub fn refs(&self) -> &PerPair<RefSet> {
        &self.refs
    }

    /// Resolved excluded close-reference set(s).
    pub fn close_refs(&self) -> &PerPair<RefSet> {
        &self.close_refs
    }

    /// String value of one attribute, as snapshotted into results.
    pub fn attr_val(&self, attr: Attr) -> String {
        match attr {
            Attr::TestSet => self.test_set.clone(),
            Attr::Lang => self.lang.clone(),
            Attr::Domain => self.domain.clone().unwrap_or_else(|| "none".to_string()),
            Attr::Level => self.level.clone().unwrap_or_else(|| "none".to_string()),
            Attr::CorrFcn => self.corr_fcn.to_string(),
            Attr::K => self.k.to_string(),
        }
    }

    /// Snapshot of all attribute values in schema order.
    pub fn attr_vals(&self) -> Vec<(Attr, String)> {
        Attr::all()
            .iter()
            .map(|&attr| (attr, self.attr_val(attr)))
            .collect()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vals: Vec<String> = Attr::all()
            .iter()
            .map(|&attr| format!("{}={}", attr.name(), self.attr_val(attr)))
            .collect();
        f.write_str(&vals.join(" "))
    }
}

/// Collapse a per-pair vector into the canonical variant: scalar for a
/// single pair, sequence otherwise.
fn per_pair<T>(mut vals: Vec<T>) -> PerPair<T> {
    if vals.len() == 1 {
        PerPair::Single(vals.remove(0))
    } else {
        PerPair::Multi(vals)
    }
}

/// Validate an explicitly supplied field against the pair count and
/// collapse a length-1 sequence to the scalar form.
fn check_shape<T>(value: PerPair<T>, n_pairs: usize, field: &str) -> EvalResult<PerPair<T>> {
    match (value, n_pairs) {
        (v @ PerPair::Single(_), 1) => Ok(v),
        (PerPair::Multi(vs), n) if vs.len() == n => Ok(per_pair(vs)),
        (v, n) => Err(EvalError::Config(format!(
            "{field} has {} value(s) but lang names {n} pair(s)",
            v.len()
        ))),
    }
}
