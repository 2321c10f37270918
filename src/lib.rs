//! # MT Metric Ranking
//!
//! Evaluates and ranks automatic machine-translation quality metrics
//! against gold human judgments.
//!
//! ## Pipeline
//!
//! 1. A [`TaskSpec`] (partially specified request) is normalized into
//!    an immutable [`Task`], resolving default gold/reference
//!    standards per `(test_set, lang)` from the [`schema`] table.
//! 2. The [`Evaluator`] runs the task against a [`ScoreStore`] and a
//!    [`CorrelationEngine`], producing a [`TaskResult`]: metrics
//!    ordered by correlation, dense ranks, and a pairwise significance
//!    matrix.
//! 3. A [`TaskSet`] expands an attribute grid into many tasks and runs
//!    them (serially or across the rayon pool); [`TaskSetResults`]
//!    aggregates them into a single fair leaderboard via hierarchical
//!    weighting and weighted average ranks.
//!
//! ## Example
//!
//! ```rust
//! use mt_metric_rank::{MemoryScoreStore, StatsEngine, Task, TaskSpec, Evaluator};
//!
//! let mut store = MemoryScoreStore::new();
//! store.add_ref("wmt22.news", "en-de", "refA", &["sys1", "sys2", "sys3"]);
//! store.add_gold(
//!     "wmt22.news",
//!     "en-de",
//!     "mqm",
//!     &[("sys1", 1.0), ("sys2", 2.0), ("sys3", 3.0)],
//! );
//! store.add_metric(
//!     "wmt22.news",
//!     "en-de",
//!     "my-metric",
//!     &[("sys1", 0.2), ("sys2", 0.4), ("sys3", 0.9)],
//! );
//!
//! let task = Task::from_spec(TaskSpec::default()).unwrap();
//! let engine = StatsEngine::default();
//! let result = Evaluator::new(&store, &engine).run(&task).unwrap();
//! assert_eq!(result.rank("my-metric"), Some(1));
//! ```

pub mod batch;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod result;
pub mod schema;
pub mod store;
pub mod task;

pub use batch::{AttrGrid, TaskSet, TaskSetResults};
pub use engine::{CorrelationEngine, EngineError, EngineOutput, StatsEngine};
pub use error::{EvalError, EvalResult};
pub use evaluator::{dense_ranks, Evaluator};
pub use result::{MetricEntry, TaskResult};
pub use schema::{standard, Attr, CorrFcn, Standard};
pub use store::{MemoryScoreStore, ScoreStore};
pub use task::{ref_set, PerPair, RefSet, Task, TaskSpec};
