//! Line-delimited JSON job consumer.
//!
//! Each input line is a job: a `GradingRequest` plus an `id` chosen by the
//! caller. Each job is graded on its own task; replies are written one line
//! each, in completion order, carrying the job's `id`.

use std::future::Future;
use std::io;
use std::sync::Arc;

use agon_common::{AppError, GradingRequest, GradingResponse};
use serde_json::{Map, Value as Json, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::grading::Grader;
use crate::sandbox::Sandbox;

const REPLY_BUFFER: usize = 64;

/// Reads jobs, grades them concurrently, writes replies
pub struct JobConsumer<S: Sandbox + 'static> {
    grader: Arc<Grader<S>>,
}

impl<S: Sandbox + 'static> JobConsumer<S> {
    pub fn new(grader: Grader<S>) -> Self {
        Self {
            grader: Arc::new(grader),
        }
    }

    /// Consume jobs from `reader` until EOF or `shutdown` resolves, then wait
    /// for in-flight jobs and hand the writer back. Returns the number of
    /// jobs accepted alongside it.
    pub async fn run<R, W, F>(&self, reader: R, writer: W, shutdown: F) -> io::Result<(usize, W)>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel::<String>(REPLY_BUFFER);
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(line) = rx.recv().await {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Ok::<_, io::Error>(writer)
        });

        let mut reader = reader;
        let mut buf = Vec::new();
        let mut jobs = JoinSet::new();
        let mut accepted = 0usize;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, finishing in-flight jobs...");
                    break;
                }
                read = reader.read_until(b'\n', &mut buf) => {
                    if read? == 0 {
                        tracing::debug!("Job input closed");
                        break;
                    }
                    match String::from_utf8(std::mem::take(&mut buf)) {
                        Ok(line) if line.trim().is_empty() => continue,
                        Ok(line) => {
                            accepted += 1;
                            self.dispatch(&line, &mut jobs, tx.clone());
                        }
                        Err(e) => {
                            accepted += 1;
                            let error = AppError::SerializationError(format!(
                                "job is not valid UTF-8: {}",
                                e.utf8_error()
                            ));
                            reject(Json::Null, error, &mut jobs, tx.clone());
                        }
                    }
                }
            }

            while let Some(finished) = jobs.try_join_next() {
                if let Err(e) = finished {
                    tracing::error!("Job task failed: {}", e);
                }
            }
        }

        while let Some(finished) = jobs.join_next().await {
            if let Err(e) = finished {
                tracing::error!("Job task failed: {}", e);
            }
        }
        drop(tx);

        let writer = writer_task.await.map_err(io::Error::other)??;
        tracing::info!(jobs = accepted, "Job consumer stopped");
        Ok((accepted, writer))
    }

    fn dispatch(&self, line: &str, jobs: &mut JoinSet<()>, tx: mpsc::Sender<String>) {
        match parse_job(line) {
            Ok((id, request)) => {
                let grader = Arc::clone(&self.grader);
                jobs.spawn(async move {
                    tracing::debug!(job_id = %id, testcases = request.testcases.len(), "Grading job");
                    let reply = match grader.grade(&request).await {
                        Ok(batch) => graded_reply(id, GradingResponse::from(batch)),
                        Err(e) => error_reply(id, &e),
                    };
                    if tx.send(reply).await.is_err() {
                        tracing::warn!("Reply writer is gone, dropping reply");
                    }
                });
            }
            Err((id, e)) => reject(id, e, jobs, tx),
        }
    }
}

/// Queue an error reply for a job that could not be graded.
fn reject(id: Json, error: AppError, jobs: &mut JoinSet<()>, tx: mpsc::Sender<String>) {
    tracing::warn!(job_id = %id, error = %error, "Rejected job");
    let reply = error_reply(id, &error);
    jobs.spawn(async move {
        let _ = tx.send(reply).await;
    });
}

/// Split a job line into its id and request. Errors keep whatever id could
/// be recovered so the reply can still be matched.
fn parse_job(line: &str) -> Result<(Json, GradingRequest), (Json, AppError)> {
    let mut raw: Json = serde_json::from_str(line).map_err(|e| (Json::Null, AppError::from(e)))?;
    let id = raw
        .as_object_mut()
        .and_then(|job| job.remove("id"))
        .unwrap_or(Json::Null);
    match serde_json::from_value(raw) {
        Ok(request) => Ok((id, request)),
        Err(e) => Err((id, e.into())),
    }
}

fn graded_reply(id: Json, response: GradingResponse) -> String {
    match serde_json::to_value(&response) {
        Ok(Json::Object(fields)) => reply_line(id, fields),
        Ok(_) => error_reply(id, &AppError::InternalError("response is not an object".into())),
        Err(e) => error_reply(id, &AppError::from(e)),
    }
}

fn error_reply(id: Json, error: &AppError) -> String {
    let mut fields = Map::new();
    fields.insert(
        "error".to_string(),
        json!({ "code": error.error_code(), "message": error.to_string() }),
    );
    reply_line(id, fields)
}

fn reply_line(id: Json, fields: Map<String, Json>) -> String {
    let mut reply = Map::new();
    reply.insert("id".to_string(), id);
    reply.extend(fields);
    let mut line = Json::Object(reply).to_string();
    line.push('\n');
    line
}
