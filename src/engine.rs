//! Correlation engine seam and the built-in statistics implementation.
//!
//! The evaluator treats the engine as a pure function: given pooled
//! metric score vectors and gold ratings, it returns one statistic per
//! metric and a pairwise significance matrix. [`StatsEngine`] is the
//! built-in implementation; external engines plug in through
//! [`CorrelationEngine`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::CorrFcn;

/// Errors reported by a correlation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fewer than two pooled observations.
    #[error("need at least 2 observations, got {0}")]
    InsufficientData(usize),

    /// A metric score vector does not align with the gold vector.
    #[error("metric score vector has length {got}, gold has {expected}")]
    LengthMismatch {
        /// Gold vector length.
        expected: usize,
        /// Offending metric vector length.
        got: usize,
    },

    /// The statistic is undefined for the given input, e.g. Pearson
    /// over a constant vector.
    #[error("{corr_fcn} is undefined for the given input")]
    Degenerate {
        /// Statistic that failed.
        corr_fcn: CorrFcn,
    },
}

/// Output of one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    /// One statistic per input metric, in input order.
    pub values: Vec<f64>,
    /// Square pairwise significance matrix in input order. Entry
    /// `[i][j]` is the one-sided p-value for "metric i outperforms
    /// metric j"; `None` means not compared (diagonal, or `k = 0`).
    pub sig_matrix: Vec<Vec<Option<f64>>>,
}

/// Pure statistical backend for task evaluation.
///
/// Must be deterministic for `k = 0`; for `k > 0` the resampling must
/// be seeded deterministically from the inputs so that repeated and
/// parallel runs agree.
pub trait CorrelationEngine: Sync {
    /// Evaluate all metrics at once against the pooled gold vector.
    fn evaluate(
        &self,
        scores: &[Vec<f64>],
        gold: &[f64],
        corr_fcn: CorrFcn,
        k: usize,
    ) -> Result<EngineOutput, EngineError>;
}

/// Built-in engine: Pearson, Kendall tau-a, pairwise accuracy, and a
/// seeded paired-permutation significance test.
#[derive(Debug, Clone)]
pub struct StatsEngine {
    seed: u64,
}

impl Default for StatsEngine {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

impl StatsEngine {
    /// Create an engine with an explicit base seed for resampling.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl CorrelationEngine for StatsEngine {
    fn evaluate(
        &self,
        scores: &[Vec<f64>],
        gold: &[f64],
        corr_fcn: CorrFcn,
        k: usize,
    ) -> Result<EngineOutput, EngineError> {
        let n = gold.len();
        if n < 2 {
            return Err(EngineError::InsufficientData(n));
        }
        for s in scores {
            if s.len() != n {
                return Err(EngineError::LengthMismatch {
                    expected: n,
                    got: s.len(),
                });
            }
        }

        let values = scores
            .iter()
            .map(|s| statistic(s, gold, corr_fcn))
            .collect::<Result<Vec<f64>, EngineError>>()?;

        let m = scores.len();
        let mut sig_matrix = vec![vec![None; m]; m];
        if k > 0 {
            for i in 0..m {
                for j in 0..m {
                    if i == j {
                        continue;
                    }
                    let seed = pair_seed(self.seed, i, j);
                    sig_matrix[i][j] = Some(permutation_pvalue(
                        &scores[i], &scores[j], gold, corr_fcn, k, seed,
                    ));
                }
            }
        }

        Ok(EngineOutput { values, sig_matrix })
    }
}

fn statistic(scores: &[f64], gold: &[f64], corr_fcn: CorrFcn) -> Result<f64, EngineError> {
    match corr_fcn {
        CorrFcn::Pearson => pearson(scores, gold),
        CorrFcn::Kendall => Ok(kendall_tau(scores, gold)),
        CorrFcn::Accuracy => pairwise_accuracy(scores, gold),
    }
}

/// Pearson product-moment correlation.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<f64, EngineError> {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return Err(EngineError::Degenerate {
            corr_fcn: CorrFcn::Pearson,
        });
    }
    Ok(cov / (var_x * var_y).sqrt())
}

/// Kendall tau-a: (concordant - discordant) / total pairs. Ties count
/// as neither.
pub fn kendall_tau(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    let mut concordant = 0i64;
    let mut discordant = 0i64;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[j] - x[i];
            let dy = y[j] - y[i];
            let prod = dx * dy;
            if prod > 0.0 {
                concordant += 1;
            } else if prod < 0.0 {
                discordant += 1;
            }
        }
    }
    let total = (n * (n - 1) / 2) as f64;
    (concordant - discordant) as f64 / total
}

/// Pairwise ranking accuracy: the fraction of item pairs ordered by
/// gold on which the metric agrees. Pairs tied in gold are not
/// comparable; a metric tie on a comparable pair counts as a miss.
pub fn pairwise_accuracy(scores: &[f64], gold: &[f64]) -> Result<f64, EngineError> {
    let n = gold.len();
    let mut comparable = 0u64;
    let mut agree = 0u64;
    for i in 0..n {
        for j in (i + 1)..n {
            let dg = gold[j] - gold[i];
            if dg == 0.0 {
                continue;
            }
            comparable += 1;
            let ds = scores[j] - scores[i];
            if ds * dg > 0.0 {
                agree += 1;
            }
        }
    }
    if comparable == 0 {
        return Err(EngineError::Degenerate {
            corr_fcn: CorrFcn::Accuracy,
        });
    }
    Ok(agree as f64 / comparable as f64)
}

/// One-sided paired-permutation p-value for "metric a outperforms
/// metric b". Each iteration swaps the two metrics' scores per item
/// with probability 1/2 and recomputes the statistic delta; the
/// p-value is the add-one-smoothed fraction of permuted deltas at or
/// above the observed one.
fn permutation_pvalue(
    a: &[f64],
    b: &[f64],
    gold: &[f64],
    corr_fcn: CorrFcn,
    k: usize,
    seed: u64,
) -> f64 {
    let observed = match (statistic(a, gold, corr_fcn), statistic(b, gold, corr_fcn)) {
        (Ok(va), Ok(vb)) => va - vb,
        // Degenerate observed statistics cannot be resolved by
        // resampling; report maximal uncertainty.
        _ => return 1.0,
    };

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut at_or_above = 0usize;
    let mut pa = vec![0.0; a.len()];
    let mut pb = vec![0.0; b.len()];
    for _ in 0..k {
        for idx in 0..a.len() {
            if rng.gen_bool(0.5) {
                pa[idx] = b[idx];
                pb[idx] = a[idx];
            } else {
                pa[idx] = a[idx];
                pb[idx] = b[idx];
            }
        }
        let delta = match (statistic(&pa, gold, corr_fcn), statistic(&pb, gold, corr_fcn)) {
            (Ok(va), Ok(vb)) => va - vb,
            // A degenerate permutation counts against significance.
            _ => f64::INFINITY,
        };
        if delta >= observed {
            at_or_above += 1;
        }
    }
    (at_or_above + 1) as f64 / (k + 1) as f64
}

/// Deterministic per-pair seed so serial and parallel runs agree.
fn pair_seed(base: u64, i: usize, j: usize) -> u64 {
    base.wrapping_mul(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(((i as u64) << 32) | j as u64)
}
