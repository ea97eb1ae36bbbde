//! Common types used across Agon services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Problem ID type
pub type ProblemId = Uuid;

/// Submission ID type
pub type SubmissionId = Uuid;

/// How the candidate object is constructed before the target method runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerMode {
    /// `CLASS_NAME()` with no arguments
    #[default]
    Plain,
    /// `CLASS_NAME(**init)` where `init` comes from the `[init]` section of the input
    WithConstructorArgs,
}

impl std::fmt::Display for RunnerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerMode::Plain => write!(f, "plain"),
            RunnerMode::WithConstructorArgs => write!(f, "with_constructor_args"),
        }
    }
}

/// How testcase outcomes turn into a submission score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// Full score only when every testcase passes
    #[default]
    AllOrNothing,
    /// Score proportional to the number of passing testcases
    Partial,
}

/// One (input, expected output) pair of a problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Testcase {
    #[validate(length(min = 1, message = "testcase_id must not be empty"))]
    pub testcase_id: String,
    /// Code binding the keyword arguments of the method call
    pub input: String,
    /// Code assigning `expected_output`, or a bare expression
    pub expected_output: String,
}

impl Testcase {
    pub fn new(
        testcase_id: impl Into<String>,
        input: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            testcase_id: testcase_id.into(),
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// A coding challenge as stored by the problem collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: ProblemId,
    pub title: String,
    /// Code defining `CLASS_NAME`, `METHOD_NAME` and shared fixtures
    pub admin_template: String,
    /// Starter code shown to the contestant
    #[serde(default)]
    pub starter_code: String,
    #[serde(default)]
    pub public_testcases: Vec<Testcase>,
    #[serde(default)]
    pub private_testcases: Vec<Testcase>,
    pub problem_score: f64,
    #[serde(default)]
    pub runner_mode: RunnerMode,
    #[serde(default)]
    pub scoring: ScoringPolicy,
}

impl Problem {
    /// Number of testcases across both pools
    pub fn total_testcases(&self) -> usize {
        self.public_testcases.len() + self.private_testcases.len()
    }
}

/// Grading result of a single testcase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestcaseOutcome {
    pub testcase_id: String,
    pub input: String,
    pub output: Option<String>,
    pub is_pass: bool,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

impl TestcaseOutcome {
    /// Outcome of a pipeline that ran to the comparison step
    pub fn compared(
        testcase: &Testcase,
        output: String,
        expected_output: String,
        is_pass: bool,
    ) -> Self {
        Self {
            testcase_id: testcase.testcase_id.clone(),
            input: testcase.input.clone(),
            output: Some(output),
            is_pass,
            error: None,
            expected_output: Some(expected_output),
        }
    }

    /// Outcome of a pipeline that stopped on an error. The error text is
    /// mirrored into `output` so the contestant sees it.
    pub fn failed(testcase: &Testcase, error: String, expected_output: Option<String>) -> Self {
        Self {
            testcase_id: testcase.testcase_id.clone(),
            input: testcase.input.clone(),
            output: Some(error.clone()),
            is_pass: false,
            error: Some(error),
            expected_output,
        }
    }

    /// Replace the mirrored error text with the value the candidate produced
    pub fn with_output(mut self, output: String) -> Self {
        self.output = Some(output);
        self
    }
}

/// Wire request for one grading batch.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GradingRequest {
    #[validate(length(min = 1, message = "admin_template must not be empty"))]
    pub admin_template: String,
    #[validate(length(min = 1, message = "candidate_code must not be empty"))]
    pub candidate_code: String,
    #[validate(nested)]
    pub testcases: Vec<Testcase>,
    #[serde(default)]
    pub run_all_on_failure: bool,
    #[serde(default)]
    pub runner_mode: RunnerMode,
}

/// Wire response of one grading batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResponse {
    pub testcase_outcomes: Vec<TestcaseOutcome>,
    pub first_error: Option<String>,
}

impl GradingResponse {
    pub fn passed_count(&self) -> usize {
        self.testcase_outcomes.iter().filter(|o| o.is_pass).count()
    }
}

/// Final status of a graded submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    /// Every testcase passed
    Accepted,
    /// Some testcase produced a different value
    WrongAnswer,
    /// A snippet exceeded its time budget
    TimeLimitExceeded,
    /// Contestant code raised, returned nothing, or returned the wrong type
    RuntimeError,
    /// The admin template itself is broken
    InternalError,
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionStatus::Accepted => write!(f, "ACCEPTED"),
            SubmissionStatus::WrongAnswer => write!(f, "WRONG_ANSWER"),
            SubmissionStatus::TimeLimitExceeded => write!(f, "TIME_LIMIT_EXCEEDED"),
            SubmissionStatus::RuntimeError => write!(f, "RUNTIME_ERROR"),
            SubmissionStatus::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Aggregated grading result persisted against a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: SubmissionId,
    pub problem_id: ProblemId,
    pub status: SubmissionStatus,
    pub score: f64,
    pub max_score: f64,
    pub passed_count: usize,
    pub total_count: usize,
    pub first_error: Option<String>,
    pub public_outcomes: Vec<TestcaseOutcome>,
    pub private_outcomes: Vec<TestcaseOutcome>,
    pub graded_at: DateTime<Utc>,
}
