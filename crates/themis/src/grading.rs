//! Grading call sites: raw batches, "run code" on the public pool, and full
//! submissions scored across both pools.

use std::sync::Arc;

use agon_common::{
    AppError, AppResult, GradingRequest, GradingResponse, Problem, ProblemId, ScoringPolicy,
    SubmissionId, SubmissionRecord, SubmissionStatus, Testcase,
};
use chrono::Utc;
use validator::Validate;

use crate::error::GradingError;
use crate::orchestrator::{self, BatchResult};
use crate::repository::{ProblemRepository, SubmissionStore};
use crate::sandbox::Sandbox;

/// Runs validated grading requests, one sandbox session per batch.
pub struct Grader<S: Sandbox> {
    sandbox: S,
    denylist: Vec<String>,
}

impl<S: Sandbox> Grader<S> {
    pub fn new(sandbox: S, denylist: Vec<String>) -> Self {
        Self { sandbox, denylist }
    }

    /// Validate `request` and grade it in a fresh session.
    pub async fn grade(&self, request: &GradingRequest) -> AppResult<BatchResult> {
        request.validate()?;

        let mut session = self.sandbox.open().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to open sandbox session");
            AppError::SandboxUnavailable(e.to_string())
        })?;

        Ok(orchestrator::run_all(&mut session, request, &self.denylist).await)
    }
}

/// Problem-aware grading on top of [`Grader`].
pub struct GradingService<S: Sandbox> {
    grader: Grader<S>,
    problems: Arc<dyn ProblemRepository>,
    submissions: Arc<dyn SubmissionStore>,
}

impl<S: Sandbox> GradingService<S> {
    pub fn new(
        grader: Grader<S>,
        problems: Arc<dyn ProblemRepository>,
        submissions: Arc<dyn SubmissionStore>,
    ) -> Self {
        Self {
            grader,
            problems,
            submissions,
        }
    }

    /// Grade a self-contained request
    pub async fn grade(&self, request: &GradingRequest) -> AppResult<GradingResponse> {
        Ok(self.grader.grade(request).await?.into())
    }

    /// Grade `code` against the public testcases only. Every testcase runs
    /// and nothing is stored.
    pub async fn run(&self, problem_id: ProblemId, code: &str) -> AppResult<GradingResponse> {
        let problem = self.problems.get_problem(problem_id).await?;
        let batch = self
            .grade_pool(&problem, code, &problem.public_testcases, true)
            .await?;
        Ok(batch.into())
    }

    /// Grade `code` against both pools, score it, and record the result.
    pub async fn submit(
        &self,
        submission_id: SubmissionId,
        problem_id: ProblemId,
        code: &str,
        run_all_on_failure: bool,
    ) -> AppResult<SubmissionRecord> {
        let problem = self.problems.get_problem(problem_id).await?;

        let public = self
            .grade_pool(&problem, code, &problem.public_testcases, run_all_on_failure)
            .await?;
        let private = self
            .grade_pool(&problem, code, &problem.private_testcases, run_all_on_failure)
            .await?;

        let passed_count = public.passed_count() + private.passed_count();
        let total_count = problem.total_testcases();
        let first_error = combine_first_error(public.first_error, private.first_error);
        let status = submission_status(first_error.as_ref(), passed_count, total_count);
        let score = compute_score(problem.scoring, problem.problem_score, passed_count, total_count);

        let record = SubmissionRecord {
            submission_id,
            problem_id,
            status,
            score,
            max_score: problem.problem_score,
            passed_count,
            total_count,
            first_error: first_error.map(|e| e.to_string()),
            public_outcomes: public.outcomes,
            private_outcomes: private.outcomes,
            graded_at: Utc::now(),
        };

        self.submissions.record(record.clone()).await?;

        tracing::info!(
            submission_id = %submission_id,
            problem_id = %problem_id,
            status = %status,
            score = score,
            passed = passed_count,
            total = total_count,
            "Submission graded"
        );

        Ok(record)
    }

    async fn grade_pool(
        &self,
        problem: &Problem,
        code: &str,
        testcases: &[Testcase],
        run_all_on_failure: bool,
    ) -> AppResult<BatchResult> {
        if testcases.is_empty() {
            return Ok(BatchResult::default());
        }
        let request = GradingRequest {
            admin_template: problem.admin_template.clone(),
            candidate_code: code.to_string(),
            testcases: testcases.to_vec(),
            run_all_on_failure,
            runner_mode: problem.runner_mode,
        };
        self.grader.grade(&request).await
    }
}

/// The public pool's error wins over the private pool's.
pub fn combine_first_error(
    public: Option<GradingError>,
    private: Option<GradingError>,
) -> Option<GradingError> {
    public.or(private)
}

/// Score earned under `policy`. A problem without testcases scores zero.
pub fn compute_score(policy: ScoringPolicy, problem_score: f64, passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    match policy {
        ScoringPolicy::AllOrNothing if passed == total => problem_score,
        ScoringPolicy::AllOrNothing => 0.0,
        ScoringPolicy::Partial => problem_score * passed as f64 / total as f64,
    }
}

pub fn submission_status(
    first_error: Option<&GradingError>,
    passed: usize,
    total: usize,
) -> SubmissionStatus {
    match first_error {
        Some(e) if e.is_internal() => SubmissionStatus::InternalError,
        Some(e) if e.is_timeout() => SubmissionStatus::TimeLimitExceeded,
        Some(_) => SubmissionStatus::RuntimeError,
        None if total > 0 && passed == total => SubmissionStatus::Accepted,
        None => SubmissionStatus::WrongAnswer,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use agon_common::RunnerMode;
    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::repository::{InMemoryProblems, InMemorySubmissions};
    use crate::sandbox::{MockSnippetExecutor, Namespace, NamespaceId, ObjectId};
    use crate::value::Value;

    /// Hands out prepared sessions in order
    struct ScriptedSandbox {
        sessions: Mutex<VecDeque<MockSnippetExecutor>>,
    }

    #[async_trait]
    impl Sandbox for ScriptedSandbox {
        type Session = MockSnippetExecutor;

        async fn open(&self) -> Result<MockSnippetExecutor, GradingError> {
            self.sessions
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| GradingError::WorkerUnavailable("no session left".into()))
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

    /// Session whose expected value is always 1 and whose method returns
    /// the given answers in order
    fn session(answers: Vec<Result<Value, GradingError>>) -> MockSnippetExecutor {
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
                Ok(namespace(2, vec![("expected_output", Value::Int(1))]))
            }
            Some(_) => Ok(namespace(3, vec![])),
        });
        executor
            .expect_instantiate()
            .returning(|_, _, _| Ok(ObjectId(4)));
        let mut calls = 0;
        executor.expect_invoke().returning(move |_, _, _| {
            let answer = answers[calls].clone();
            calls += 1;
            answer
        });
        executor
    }

    fn problem(scoring: ScoringPolicy) -> Problem {
        Problem {
            id: Uuid::new_v4(),
            title: "Identity".into(),
            admin_template: "CLASS_NAME = 'Solution'\nMETHOD_NAME = 'solve'".into(),
            starter_code: "class Solution:\n    def solve(self):\n        pass".into(),
            public_testcases: vec![Testcase::new("p1", "", "1"), Testcase::new("p2", "", "1")],
            private_testcases: vec![Testcase::new("s1", "", "1"), Testcase::new("s2", "", "1")],
            problem_score: 100.0,
            runner_mode: RunnerMode::Plain,
            scoring,
        }
    }

    async fn service(
        problem: &Problem,
        sessions: Vec<MockSnippetExecutor>,
    ) -> (GradingService<ScriptedSandbox>, Arc<InMemorySubmissions>) {
        let problems = Arc::new(InMemoryProblems::new());
        problems.insert(problem.clone()).await;
        let submissions = Arc::new(InMemorySubmissions::new());
        let sandbox = ScriptedSandbox {
            sessions: Mutex::new(sessions.into()),
        };
        let service = GradingService::new(
            Grader::new(sandbox, vec!["import ".into()]),
            problems,
            submissions.clone(),
        );
        (service, submissions)
    }

    #[test]
    fn test_compute_score() {
        assert_eq!(compute_score(ScoringPolicy::AllOrNothing, 100.0, 4, 4), 100.0);
        assert_eq!(compute_score(ScoringPolicy::AllOrNothing, 100.0, 3, 4), 0.0);
        assert_eq!(compute_score(ScoringPolicy::Partial, 100.0, 3, 4), 75.0);
        assert_eq!(compute_score(ScoringPolicy::Partial, 100.0, 0, 0), 0.0);
    }

    #[test]
    fn test_public_error_preferred() {
        let public = GradingError::NullOutput;
        let private = GradingError::Invocation("ValueError".into());
        assert_eq!(
            combine_first_error(Some(public.clone()), Some(private.clone())),
            Some(public)
        );
        assert_eq!(combine_first_error(None, Some(private.clone())), Some(private));
        assert_eq!(combine_first_error(None, None), None);
    }

    #[test]
    fn test_submission_status() {
        let timeout = GradingError::ExecutionTimeout(Duration::from_secs(10));
        let missing = GradingError::MissingConvention("CLASS_NAME".into());
        assert_eq!(submission_status(None, 3, 3), SubmissionStatus::Accepted);
        assert_eq!(submission_status(None, 2, 3), SubmissionStatus::WrongAnswer);
        assert_eq!(submission_status(None, 0, 0), SubmissionStatus::WrongAnswer);
        assert_eq!(
            submission_status(Some(&timeout), 0, 3),
            SubmissionStatus::TimeLimitExceeded
        );
        assert_eq!(
            submission_status(Some(&missing), 0, 3),
            SubmissionStatus::InternalError
        );
        assert_eq!(
            submission_status(Some(&GradingError::NullOutput), 0, 3),
            SubmissionStatus::RuntimeError
        );
    }

    #[tokio::test]
    async fn test_submit_scores_both_pools() {
        let problem = problem(ScoringPolicy::Partial);
        let sessions = vec![
            session(vec![Ok(Value::Int(1)), Ok(Value::Int(1))]),
            session(vec![Ok(Value::Int(1)), Ok(Value::Int(2))]),
        ];
        let (service, submissions) = service(&problem, sessions).await;

        let submission_id = Uuid::new_v4();
        let record = service
            .submit(submission_id, problem.id, "class Solution: pass", true)
            .await
            .unwrap();

        assert_eq!(record.passed_count, 3);
        assert_eq!(record.total_count, 4);
        assert_eq!(record.score, 75.0);
        assert_eq!(record.status, SubmissionStatus::WrongAnswer);
        assert_eq!(record.public_outcomes.len(), 2);
        assert_eq!(record.private_outcomes.len(), 2);
        assert!(submissions.get(submission_id).await.is_some());
    }

    #[tokio::test]
    async fn test_submit_prefers_public_error() {
        let problem = problem(ScoringPolicy::AllOrNothing);
        let sessions = vec![
            session(vec![Ok(Value::Int(1)), Ok(Value::None)]),
            session(vec![Err(GradingError::Invocation("KeyError: 3".into()))]),
        ];
        let (service, _) = service(&problem, sessions).await;

        let record = service
            .submit(Uuid::new_v4(), problem.id, "class Solution: pass", false)
            .await
            .unwrap();

        assert_eq!(record.first_error.as_deref(), Some("output is none"));
        assert_eq!(record.status, SubmissionStatus::RuntimeError);
        assert_eq!(record.score, 0.0);
        assert_eq!(record.private_outcomes.len(), 1);
    }

    #[tokio::test]
    async fn test_run_uses_public_pool_only() {
        let problem = problem(ScoringPolicy::AllOrNothing);
        let sessions = vec![session(vec![Ok(Value::Int(2)), Ok(Value::Int(1))])];
        let (service, _) = service(&problem, sessions).await;

        let response = service.run(problem.id, "class Solution: pass").await.unwrap();
        assert_eq!(response.testcase_outcomes.len(), 2);
        assert_eq!(response.passed_count(), 1);
        assert!(response.first_error.is_none());
    }

    #[tokio::test]
    async fn test_invalid_request_rejected() {
        let (service, _) = service(&problem(ScoringPolicy::Partial), vec![]).await;
        let request = GradingRequest {
            admin_template: String::new(),
            candidate_code: "class Solution: pass".into(),
            testcases: vec![],
            run_all_on_failure: false,
            runner_mode: RunnerMode::Plain,
        };

        let err = service.grade(&request).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_problem() {
        let (service, _) = service(&problem(ScoringPolicy::Partial), vec![]).await;
        let err = service.run(Uuid::new_v4(), "x = 1").await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}
