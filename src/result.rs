//! Task evaluation results.
//!
//! A [`TaskResult`] owns the rank-ordered metric list with correlation
//! values and dense ranks, the pairwise significance matrix in the
//! same order, and a string snapshot of the originating task's
//! attributes. It renders as a fixed-width leaderboard block and
//! round-trips through a line-oriented text form.

use std::io::{BufRead, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};
use crate::schema::Attr;

/// Significance threshold for the rendered comparison characters.
const SIG_P: f64 = 0.05;

const WIRE_HEADER: &str = "taskresult v1";

/// One ranked metric: name, correlation value, dense rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    /// Metric name.
    pub name: String,
    /// Correlation (or accuracy) value against gold.
    pub corr: f64,
    /// Dense rank; ties share a rank, the next distinct value gets
    /// the previous rank plus one.
    pub rank: usize,
}

/// Outcome of evaluating one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    attr_vals: Vec<(Attr, String)>,
    entries: Vec<MetricEntry>,
    sig_matrix: Vec<Vec<Option<f64>>>,
}

impl TaskResult {
    /// Assemble a result from its parts. `sig_matrix` must be square
    /// with one row per entry, in the same (rank) order as `entries`.
    pub fn new(
        attr_vals: Vec<(Attr, String)>,
        entries: Vec<MetricEntry>,
        sig_matrix: Vec<Vec<Option<f64>>>,
    ) -> Self {
        debug_assert_eq!(sig_matrix.len(), entries.len());
        debug_assert!(sig_matrix.iter().all(|row| row.len() == entries.len()));
        Self {
            attr_vals,
            entries,
            sig_matrix,
        }
    }

    /// Metric names in rank order.
    pub fn metrics(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Ranked entries.
    pub fn entries(&self) -> &[MetricEntry] {
        &self.entries
    }

    /// Correlation value for a metric.
    pub fn corr(&self, metric: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.name == metric)
            .map(|e| e.corr)
    }

    /// Dense rank for a metric.
    pub fn rank(&self, metric: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.name == metric)
            .map(|e| e.rank)
    }

    /// Pairwise significance matrix in rank order.
    pub fn sig_matrix(&self) -> &[Vec<Option<f64>>] {
        &self.sig_matrix
    }

    /// Snapshot of the originating task's attribute values.
    pub fn attr_vals(&self) -> &[(Attr, String)] {
        &self.attr_vals
    }

    /// Snapshot value of one attribute.
    pub fn attr_val(&self, attr: Attr) -> &str {
        self.attr_vals
            .iter()
            .find(|(a, _)| *a == attr)
            .map(|(_, v)| v.as_str())
            .unwrap_or("none")
    }

    /// Comparison character for row `i`, column `j` of the rendered
    /// block: `.` on the diagonal or when not significant, `>` when
    /// metric `i` is significantly better than `j`, `<` when
    /// significantly worse (p < 0.05).
    pub fn sig_char(&self, i: usize, j: usize) -> char {
        if i == j {
            return '.';
        }
        match self.sig_matrix[i][j] {
            Some(p) if p < SIG_P => '>',
            _ => match self.sig_matrix[j][i] {
                Some(p) if p < SIG_P => '<',
                _ => '.',
            },
        }
    }

    /// Render one line per metric: padded name, dense rank, value to
    /// seven decimal places, then one comparison character per metric
    /// in rank order.
    pub fn to_display_string(&self) -> String {
        let name_w = self
            .entries
            .iter()
            .map(|e| e.name.len())
            .max()
            .unwrap_or(0);
        let rank_w = self
            .entries
            .iter()
            .map(|e| e.rank.to_string().len())
            .max()
            .unwrap_or(1);
        let mut out = String::new();
        for (i, e) in self.entries.iter().enumerate() {
            let sigs: Vec<String> = (0..self.entries.len())
                .map(|j| self.sig_char(i, j).to_string())
                .collect();
            out.push_str(&format!(
                "{:<name_w$}  {:>rank_w$}  {:.7}  {}\n",
                e.name,
                e.rank,
                e.corr,
                sigs.join(" ")
            ));
        }
        out
    }

    /// JSON export of the full result.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the line-oriented text form. [`TaskResult::read`] on the
    /// output reconstructs a value-equal result.
    pub fn write<W: Write>(&self, w: &mut W) -> EvalResult<()> {
        writeln!(w, "{WIRE_HEADER}")?;
        for (attr, val) in &self.attr_vals {
            writeln!(w, "attr\t{}\t{}", attr.name(), val)?;
        }
        for e in &self.entries {
            // `{}` on f64 prints the shortest exactly round-tripping
            // decimal form.
            writeln!(w, "metric\t{}\t{}\t{}", e.name, e.rank, e.corr)?;
        }
        for row in &self.sig_matrix {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    Some(p) => format!("{p}"),
                    None => "-".to_string(),
                })
                .collect();
            writeln!(w, "sig\t{}", cells.join("\t"))?;
        }
        writeln!(w, "end")?;
        Ok(())
    }

    /// Read the text form produced by [`TaskResult::write`].
    ///
    /// Fails with [`EvalError::Parse`] on any malformed line; never
    /// returns a partially populated result.
    pub fn read<R: BufRead>(r: &mut R) -> EvalResult<TaskResult> {
        let mut lines = r.lines();
        let header = lines
            .next()
            .ok_or_else(|| EvalError::Parse("missing header".into()))??;
        if header != WIRE_HEADER {
            return Err(EvalError::Parse(format!("unexpected header '{header}'")));
        }

        let mut attr_vals = Vec::new();
        let mut entries = Vec::new();
        let mut sig_matrix: Vec<Vec<Option<f64>>> = Vec::new();
        let mut terminated = false;

        for line in lines {
            let line = line?;
            if line == "end" {
                terminated = true;
                break;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            match fields.as_slice() {
                ["attr", name, val] => {
                    let attr = Attr::from_str(name)
                        .map_err(|_| EvalError::Parse(format!("unknown attribute '{name}'")))?;
                    attr_vals.push((attr, (*val).to_string()));
                }
                ["metric", name, rank, corr] => {
                    let rank: usize = rank
                        .parse()
                        .map_err(|_| EvalError::Parse(format!("bad rank '{rank}'")))?;
                    let corr: f64 = corr
                        .parse()
                        .map_err(|_| EvalError::Parse(format!("bad correlation '{corr}'")))?;
                    entries.push(MetricEntry {
                        name: (*name).to_string(),
                        corr,
                        rank,
                    });
                }
                ["sig", cells @ ..] => {
                    let row = cells
                        .iter()
                        .map(|cell| {
                            if *cell == "-" {
                                Ok(None)
                            } else {
                                cell.parse::<f64>().map(Some).map_err(|_| {
                                    EvalError::Parse(format!("bad p-value '{cell}'"))
                                })
                            }
                        })
                        .collect::<EvalResult<Vec<Option<f64>>>>()?;
                    sig_matrix.push(row);
                }
                _ => return Err(EvalError::Parse(format!("unrecognized line '{line}'"))),
            }
        }

        if !terminated {
            return Err(EvalError::Parse("missing end marker".into()));
        }
        if sig_matrix.len() != entries.len()
            || sig_matrix.iter().any(|row| row.len() != entries.len())
        {
            return Err(EvalError::Parse(
                "significance matrix does not match metric count".into(),
            ));
        }

        Ok(TaskResult {
            attr_vals,
            entries,
            sig_matrix,
        })
    }
}
