//! Evaluation attribute schema.
//!
//! Defines the closed set of configuration attributes recognized by
//! tasks and weighting, the correlation statistic names, and the
//! static gold/reference standards table keyed by
//! `(test_set, lang_pair)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Default benchmark collection for unspecified tasks.
pub const DEFAULT_TEST_SET: &str = "wmt22.news";

/// Default language pair for unspecified tasks.
pub const DEFAULT_LANG: &str = "en-de";

/// Default scoring granularity (system-level).
pub const DEFAULT_LEVEL: &str = "sys";

/// Configuration attributes carried by every task.
///
/// The set is closed: weighting and grouping operate only over these
/// attributes, in the order returned by [`Attr::all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attr {
    /// Benchmark collection identifier.
    TestSet,
    /// Language pair, or comma-joined pairs for pooled evaluation.
    Lang,
    /// Optional text domain stratification.
    Domain,
    /// Scoring granularity (`sys` or `seg`).
    Level,
    /// Correlation statistic applied by the engine.
    CorrFcn,
    /// Resampling iteration count for significance testing.
    K,
}

impl Attr {
    /// All attributes in canonical order.
    ///
    /// `average_ranks` recurses over this order when assigning weights.
    pub fn all() -> &'static [Attr] {
        &[
            Attr::TestSet,
            Attr::Lang,
            Attr::Domain,
            Attr::Level,
            Attr::CorrFcn,
            Attr::K,
        ]
    }

    /// Canonical attribute name.
    pub fn name(self) -> &'static str {
        match self {
            Attr::TestSet => "test_set",
            Attr::Lang => "lang",
            Attr::Domain => "domain",
            Attr::Level => "level",
            Attr::CorrFcn => "corr_fcn",
            Attr::K => "k",
        }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attr {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test_set" => Ok(Attr::TestSet),
            "lang" => Ok(Attr::Lang),
            "domain" => Ok(Attr::Domain),
            "level" => Ok(Attr::Level),
            "corr_fcn" => Ok(Attr::CorrFcn),
            "k" => Ok(Attr::K),
            other => Err(EvalError::Config(format!("unknown attribute '{other}'"))),
        }
    }
}

/// Correlation or accuracy statistic computed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CorrFcn {
    /// Pearson product-moment correlation.
    #[default]
    Pearson,
    /// Kendall tau rank correlation.
    Kendall,
    /// Pairwise ranking accuracy against gold.
    Accuracy,
}

impl CorrFcn {
    /// Canonical statistic name.
    pub fn name(self) -> &'static str {
        match self {
            CorrFcn::Pearson => "pearson",
            CorrFcn::Kendall => "kendall",
            CorrFcn::Accuracy => "accuracy",
        }
    }
}

impl fmt::Display for CorrFcn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CorrFcn {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pearson" => Ok(CorrFcn::Pearson),
            "kendall" => Ok(CorrFcn::Kendall),
            "accuracy" => Ok(CorrFcn::Accuracy),
            other => Err(EvalError::Config(format!(
                "unknown correlation function '{other}'"
            ))),
        }
    }
}

/// Documented gold source and admissible references for one
/// collection/pair combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standard {
    /// Gold human-judgment source identifier.
    pub gold: &'static str,
    /// Admissible reference translation identifiers.
    pub refs: &'static [&'static str],
    /// References excluded from scoring because they are close
    /// paraphrases of the primary references.
    pub close_refs: &'static [&'static str],
}

/// Look up the documented standard for `(test_set, lang_pair)`.
///
/// Returns `None` for combinations with no known gold/reference
/// assignment; task construction turns that into a configuration
/// error rather than guessing.
pub fn standard(test_set: &str, lang_pair: &str) -> Option<Standard> {
    let (gold, refs, close_refs): (&str, &[&str], &[&str]) = match (test_set, lang_pair) {
        ("wmt22.news", "en-de") => ("mqm", &["refA"], &[]),
        ("wmt22.news", "en-ru") => ("mqm", &["refA"], &[]),
        ("wmt22.news", "zh-en") => ("mqm", &["refA"], &[]),
        ("wmt21.news", "en-de") => ("mqm", &["refC"], &["refB"]),
        ("wmt21.news", "en-ru") => ("mqm", &["refA"], &[]),
        ("wmt21.news", "zh-en") => ("mqm", &["refB"], &[]),
        ("wmt21.tedtalks", "en-de") => ("mqm", &["refA"], &[]),
        _ => return None,
    };
    Some(Standard {
        gold,
        refs,
        close_refs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_roundtrip() {
        for &attr in Attr::all() {
            assert_eq!(attr.name().parse::<Attr>().unwrap(), attr);
        }
        assert!("weights".parse::<Attr>().is_err());
    }

    #[test]
    fn test_corr_fcn_roundtrip() {
        for fcn in [CorrFcn::Pearson, CorrFcn::Kendall, CorrFcn::Accuracy] {
            assert_eq!(fcn.name().parse::<CorrFcn>().unwrap(), fcn);
        }
        assert!("spearman".parse::<CorrFcn>().is_err());
    }

    #[test]
    fn test_standard_lookup() {
        let std = standard("wmt21.news", "en-de").unwrap();
        assert_eq!(std.gold, "mqm");
        assert_eq!(std.refs, &["refC"]);
        assert_eq!(std.close_refs, &["refB"]);

        assert!(standard("wmt19.news", "en-de").is_none());
        assert!(standard("wmt22.news", "en-fi").is_none());
    }
}
