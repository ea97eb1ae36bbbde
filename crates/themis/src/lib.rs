//! Themis - grading engine for Agon
//!
//! Runs contestant code against an admin template and a list of testcases
//! inside isolated Python worker processes, and compares each result
//! structurally against the expected value.

pub mod comparator;
pub mod config;
pub mod consumer;
pub mod error;
pub mod grading;
pub mod metrics;
pub mod orchestrator;
pub mod repository;
pub mod runner;
pub mod sandbox;
pub mod template;
pub mod value;

pub use comparator::compare;
pub use error::{ComparisonError, GradingError};
pub use grading::{Grader, GradingService};
pub use orchestrator::{BatchResult, run_all};
pub use runner::{run_testcase, run_testcase_detailed};
pub use sandbox::{PythonSandbox, PythonSession, Sandbox, SnippetExecutor};
pub use template::{AdminContext, load_admin_context};
pub use value::Value;
