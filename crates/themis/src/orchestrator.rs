//! Batch orchestration: one admin template, one candidate, many testcases.

use agon_common::{GradingRequest, GradingResponse, TestcaseOutcome};

use crate::error::GradingError;
use crate::metrics;
use crate::runner::run_testcase_detailed;
use crate::sandbox::SnippetExecutor;
use crate::template::load_admin_context;

/// Outcomes of one batch, in testcase order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub outcomes: Vec<TestcaseOutcome>,
    /// First error met, whether it came from the admin template or a testcase
    pub first_error: Option<GradingError>,
}

impl BatchResult {
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_pass).count()
    }
}

impl From<BatchResult> for GradingResponse {
    fn from(batch: BatchResult) -> Self {
        Self {
            testcase_outcomes: batch.outcomes,
            first_error: batch.first_error.map(|e| e.to_string()),
        }
    }
}

/// Grade every testcase of `request` within one executor session.
///
/// The admin template runs once; a failure there aborts the batch with no
/// outcomes. Testcases then run in order on top of the shared admin
/// namespace. Without `run_all_on_failure` the batch stops after the first
/// outcome carrying an error; a wrong answer alone never stops it.
pub async fn run_all<E>(executor: &mut E, request: &GradingRequest, denylist: &[String]) -> BatchResult
where
    E: SnippetExecutor + ?Sized,
{
    metrics::BATCHES_TOTAL.inc();
    let timer = metrics::BATCH_DURATION.start_timer();

    let ctx = match load_admin_context(executor, &request.admin_template).await {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "Admin template rejected, aborting batch");
            timer.observe_duration();
            return BatchResult {
                outcomes: Vec::new(),
                first_error: Some(e),
            };
        }
    };

    let mut outcomes = Vec::with_capacity(request.testcases.len());
    let mut first_error = None;

    for testcase in &request.testcases {
        let (outcome, error) = run_testcase_detailed(
            executor,
            &ctx,
            &request.candidate_code,
            testcase,
            request.runner_mode,
            denylist,
        )
        .await;

        metrics::record_outcome(match (&error, outcome.is_pass) {
            (Some(_), _) => "error",
            (None, true) => "pass",
            (None, false) => "fail",
        });
        outcomes.push(outcome);

        if let Some(error) = error {
            if first_error.is_none() {
                first_error = Some(error);
            }
            if !request.run_all_on_failure {
                tracing::debug!(testcase_id = %testcase.testcase_id, "Stopping batch at first error");
                break;
            }
        }
    }

    timer.observe_duration();

    let batch = BatchResult {
        outcomes,
        first_error,
    };
    tracing::info!(
        testcases = request.testcases.len(),
        graded = batch.outcomes.len(),
        passed = batch.passed_count(),
        runner_mode = %request.runner_mode,
        first_error = ?batch.first_error.as_ref().map(|e| e.to_string()),
        "Batch graded"
    );
    batch
}

#[cfg(test)]
mod tests {
    use agon_common::{RunnerMode, Testcase};

    use super::*;
    use crate::sandbox::denylist::default_denylist;
    use crate::sandbox::{MockSnippetExecutor, Namespace, NamespaceId, ObjectId};
    use crate::value::Value;

    const TEMPLATE: &str = "CLASS_NAME = 'Solution'\nMETHOD_NAME = 'solve'";

    fn request(run_all_on_failure: bool) -> GradingRequest {
        GradingRequest {
            admin_template: TEMPLATE.into(),
            candidate_code: "class Solution:\n    def solve(self, n):\n        return n".into(),
            testcases: vec![
                Testcase::new("t1", "n = 1", "1"),
                Testcase::new("t2", "n = 2", "2"),
                Testcase::new("t3", "n = 3", "3"),
            ],
            run_all_on_failure,
            runner_mode: RunnerMode::Plain,
        }
    }

    fn namespace(id: u64, bindings: Vec<(&str, Value)>) -> Namespace {
        Namespace {
            id: NamespaceId(id),
            bindings: bindings
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Executor for `request()`; the method answers each call with the
    /// next entry of `answers`.
    fn executor(answers: Vec<Result<Value, GradingError>>) -> MockSnippetExecutor {
        let mut executor = MockSnippetExecutor::new();
        executor.expect_execute().returning(|code, base| match base {
            None => Ok(namespace(
                1,
                vec![
                    ("CLASS_NAME", Value::Str("Solution".into())),
                    ("METHOD_NAME", Value::Str("solve".into())),
                ],
            )),
            Some(_) if code.contains("expected_output") => {
                let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
                let n = digits.parse().unwrap();
                Ok(namespace(2, vec![("expected_output", Value::Int(n))]))
            }
            Some(_) => Ok(namespace(3, vec![])),
        });
        executor
            .expect_instantiate()
            .returning(|_, _, _| Ok(ObjectId(9)));

        let mut calls = 0;
        executor.expect_invoke().returning(move |_, _, _| {
            let answer = answers[calls].clone();
            calls += 1;
            answer
        });
        executor
    }

    fn failure() -> Result<Value, GradingError> {
        Err(GradingError::Invocation("ZeroDivisionError: division by zero".into()))
    }

    #[tokio::test]
    async fn test_all_pass() {
        let mut executor = executor(vec![Ok(Value::Int(1)), Ok(Value::Int(2)), Ok(Value::Int(3))]);
        let batch = run_all(&mut executor, &request(false), &default_denylist()).await;

        assert_eq!(batch.outcomes.len(), 3);
        assert_eq!(batch.passed_count(), 3);
        assert!(batch.first_error.is_none());
        let ids: Vec<_> = batch.outcomes.iter().map(|o| o.testcase_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn test_stop_on_first_error() {
        let mut executor = executor(vec![failure(), Ok(Value::Int(2)), Ok(Value::Int(3))]);
        let batch = run_all(&mut executor, &request(false), &default_denylist()).await;

        assert_eq!(batch.outcomes.len(), 1);
        assert_eq!(
            batch.first_error.map(|e| e.to_string()).as_deref(),
            Some("InvocationError: ZeroDivisionError: division by zero")
        );
    }

    #[tokio::test]
    async fn test_run_all_keeps_first_error() {
        let mut executor = executor(vec![
            failure(),
            Ok(Value::None),
            Ok(Value::Int(3)),
        ]);
        let batch = run_all(&mut executor, &request(true), &default_denylist()).await;

        assert_eq!(batch.outcomes.len(), 3);
        assert_eq!(batch.passed_count(), 1);
        assert_eq!(batch.outcomes[1].error.as_deref(), Some("output is none"));

        let response = GradingResponse::from(batch);
        assert_eq!(
            response.first_error.as_deref(),
            Some("InvocationError: ZeroDivisionError: division by zero")
        );
    }

    #[tokio::test]
    async fn test_wrong_answer_does_not_stop() {
        let mut executor = executor(vec![Ok(Value::Int(7)), Ok(Value::Int(2)), Ok(Value::Int(3))]);
        let batch = run_all(&mut executor, &request(false), &default_denylist()).await;

        assert_eq!(batch.outcomes.len(), 3);
        assert_eq!(batch.passed_count(), 2);
        assert!(!batch.outcomes[0].is_pass);
        assert!(batch.outcomes[0].error.is_none());
        assert!(batch.first_error.is_none());
    }

    #[tokio::test]
    async fn test_admin_failure_aborts_batch() {
        let mut executor = MockSnippetExecutor::new();
        executor
            .expect_execute()
            .times(1)
            .returning(|_, _| Ok(namespace(1, vec![("CLASS_NAME", Value::Str("Solution".into()))])));
        executor.expect_instantiate().never();
        executor.expect_invoke().never();

        let batch = run_all(&mut executor, &request(true), &default_denylist()).await;
        assert!(batch.outcomes.is_empty());
        assert_eq!(
            batch.first_error,
            Some(GradingError::MissingConvention("METHOD_NAME".into()))
        );
    }
}
