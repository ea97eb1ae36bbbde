//! Error taxonomy of the grading pipeline.
//!
//! The `Display` text of each variant is exactly what ends up in a
//! testcase outcome's `error` field, so messages are written for
//! contestants as much as for operators.

use std::time::Duration;

use thiserror::Error;

/// Raised by the structural comparator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComparisonError {
    /// `type(actual) != type(expected)`
    #[error("ComparisonTypeError: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Both sides share a type the comparator does not know how to compare
    #[error("ComparisonTypeError: unsupported type {0}")]
    Unsupported(String),
}

/// Every way a grading step can fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradingError {
    /// Snippet exceeded its wall-clock budget
    #[error("TimeoutError: execution exceeded the {}s time limit", .0.as_secs_f64())]
    ExecutionTimeout(Duration),

    /// Snippet raised; carries the one-line exception text
    #[error("{0}")]
    Execution(String),

    /// Admin namespace lacks a required key
    #[error("admin template must define {0}")]
    MissingConvention(String),

    /// The admin template itself failed to run
    #[error("admin template failed: {0}")]
    AdminTemplate(Box<GradingError>),

    /// Target method returned `None`
    #[error("output is none")]
    NullOutput,

    #[error(transparent)]
    Comparison(#[from] ComparisonError),

    /// Instantiating the candidate class failed
    #[error("ConstructionError: {0}")]
    Construction(String),

    /// Locating or calling the target method failed
    #[error("InvocationError: {0}")]
    Invocation(String),

    /// The worker process could not be started or died
    #[error("sandbox worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The worker replied with something we could not understand
    #[error("sandbox protocol error: {0}")]
    Protocol(String),
}

impl GradingError {
    /// Whether this error (or the error it wraps) is a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            GradingError::ExecutionTimeout(_) => true,
            GradingError::AdminTemplate(inner) => inner.is_timeout(),
            _ => false,
        }
    }

    /// Whether the failure lies with the problem setup or the platform rather
    /// than with the contestant's code
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            GradingError::MissingConvention(_)
                | GradingError::AdminTemplate(_)
                | GradingError::WorkerUnavailable(_)
                | GradingError::Protocol(_)
        )
    }
}
