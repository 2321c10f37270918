//! Error types for mt-metric-rank.
//!
//! All fallible operations in this crate return [`EvalResult<T>`] with
//! the [`EvalError`] taxonomy: configuration problems are fatal to a
//! single task's construction, evaluation problems are fatal to a
//! single task's run, and parse problems are fatal to deserialization
//! (a partially populated result is never produced).

use thiserror::Error;

/// Top-level error type for task construction, evaluation, and
/// result serialization.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A task configuration is malformed or cannot be resolved.
    ///
    /// Raised for an empty language pair list, an unknown
    /// `(test_set, lang)` combination in the standards table, or
    /// explicitly supplied gold/reference fields whose shape does not
    /// match the number of language pairs.
    #[error("configuration error: {0}")]
    Config(String),

    /// No metric had complete score coverage for the task.
    ///
    /// A metric missing scores for some language pair is silently
    /// excluded; this error is raised only when nothing at all
    /// qualifies. Batch runs treat it like any other task failure
    /// (strict mode, see `TaskSet::run`).
    #[error("no metric has complete coverage for task [{task}]")]
    EmptyResult {
        /// Attribute snapshot of the failing task.
        task: String,
    },

    /// The correlation engine rejected the task's input.
    #[error("evaluation failed for task [{task}]: {message}")]
    Evaluation {
        /// Attribute snapshot of the failing task.
        task: String,
        /// Engine-reported cause.
        message: String,
    },

    /// Serialized task result text is malformed.
    #[error("malformed task result: {0}")]
    Parse(String),

    /// I/O failure while writing or reading a serialized result.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for crate operations.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EvalError::Config("bad lang".into());
        assert!(err.to_string().contains("bad lang"));

        let err = EvalError::EmptyResult {
            task: "wmt22.news en-de".into(),
        };
        assert!(err.to_string().contains("wmt22.news en-de"));
    }
}
