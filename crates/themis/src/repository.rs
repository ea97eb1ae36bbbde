//! Collaborators the grading service talks to: problem lookup and result
//! storage. Persistence technology is left to the embedding platform; the
//! in-memory implementations back the worker binary and the tests.

use std::collections::HashMap;

use agon_common::{AppError, AppResult, Problem, ProblemId, SubmissionId, SubmissionRecord};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Read access to problems and their testcases
#[async_trait]
pub trait ProblemRepository: Send + Sync {
    async fn get_problem(&self, id: ProblemId) -> AppResult<Problem>;
}

/// Write access to graded submissions
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn record(&self, record: SubmissionRecord) -> AppResult<()>;
}

#[derive(Default)]
pub struct InMemoryProblems {
    problems: RwLock<HashMap<ProblemId, Problem>>,
}

impl InMemoryProblems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a problem
    pub async fn insert(&self, problem: Problem) {
        self.problems.write().await.insert(problem.id, problem);
    }
}

#[async_trait]
impl ProblemRepository for InMemoryProblems {
    async fn get_problem(&self, id: ProblemId) -> AppResult<Problem> {
        self.problems
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Problem {}", id)))
    }
}

#[derive(Default)]
pub struct InMemorySubmissions {
    records: RwLock<HashMap<SubmissionId, SubmissionRecord>>,
}

impl InMemorySubmissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: SubmissionId) -> Option<SubmissionRecord> {
        self.records.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl SubmissionStore for InMemorySubmissions {
    async fn record(&self, record: SubmissionRecord) -> AppResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.submission_id) {
            return Err(AppError::Conflict(format!(
                "Submission {} already graded",
                record.submission_id
            )));
        }
        records.insert(record.submission_id, record);
        Ok(())
    }
}
