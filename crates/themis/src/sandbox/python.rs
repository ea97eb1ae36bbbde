//! Python worker sandbox.
//!
//! Each session owns one `python3` worker process running `worker.py`. The
//! worker keeps namespaces and objects in memory and answers one JSON line per
//! request. Every request is raced against the configured budget; on timeout
//! the worker is abandoned (killed on drop) and the next request spawns a new
//! one, replaying the base-less executions (the admin template) into the same
//! namespace handles.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use super::protocol::{WorkerReply, WorkerRequest};
use super::{Namespace, NamespaceId, ObjectId, Sandbox, SnippetExecutor};
use crate::config::SandboxConfig;
use crate::error::GradingError;
use crate::metrics;
use crate::value::Value;

const WORKER_SCRIPT: &str = include_str!("worker.py");

/// Opens Python worker sessions, bounded by `max_workers`.
#[derive(Clone)]
pub struct PythonSandbox {
    config: Arc<SandboxConfig>,
    slots: Arc<Semaphore>,
}

impl PythonSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            config: Arc::new(config),
            slots,
        }
    }
}

#[async_trait]
impl Sandbox for PythonSandbox {
    type Session = PythonSession;

    async fn open(&self) -> Result<PythonSession, GradingError> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GradingError::WorkerUnavailable("sandbox is shut down".to_string()))?;

        let worker = Worker::spawn(&self.config)?;
        metrics::ACTIVE_SESSIONS.inc();

        Ok(PythonSession {
            config: Arc::clone(&self.config),
            worker: Some(worker),
            roots: Vec::new(),
            next_request: 0,
            next_handle: 0,
            _permit: permit,
        })
    }
}

/// A live worker process and its protocol streams
struct Worker {
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    _scratch: TempDir,
}

impl Worker {
    fn spawn(config: &SandboxConfig) -> Result<Self, GradingError> {
        let scratch = tempfile::Builder::new()
            .prefix("themis-")
            .tempdir()
            .map_err(|e| GradingError::WorkerUnavailable(format!("scratch dir: {e}")))?;

        let mut child = Command::new(&config.python_bin)
            .arg("-I")
            .arg("-u")
            .arg("-c")
            .arg(WORKER_SCRIPT)
            .arg(config.memory_limit_bytes.to_string())
            .current_dir(scratch.path())
            .env("OPENBLAS_NUM_THREADS", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GradingError::WorkerUnavailable(format!(
                    "failed to start {}: {}",
                    config.python_bin, e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GradingError::WorkerUnavailable("worker stdin missing".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GradingError::WorkerUnavailable("worker stdout missing".to_string()))?;

        tracing::debug!(pid = ?child.id(), "Spawned sandbox worker");

        Ok(Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            _scratch: scratch,
        })
    }

    async fn exchange(&mut self, line: &str) -> Result<String, GradingError> {
        let lost = |e: std::io::Error| GradingError::WorkerUnavailable(e.to_string());

        self.stdin.write_all(line.as_bytes()).await.map_err(lost)?;
        self.stdin.flush().await.map_err(lost)?;

        self.stdout
            .next_line()
            .await
            .map_err(lost)?
            .ok_or_else(|| GradingError::WorkerUnavailable("worker exited unexpectedly".to_string()))
    }
}

/// One grading batch's view of the Python sandbox.
pub struct PythonSession {
    config: Arc<SandboxConfig>,
    worker: Option<Worker>,
    /// Base-less executions, replayed when a worker is replaced
    roots: Vec<(NamespaceId, String)>,
    next_request: u64,
    next_handle: u64,
    _permit: OwnedSemaphorePermit,
}

impl PythonSession {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Send a request to the current worker, spawning a replacement first if
    /// the previous one was abandoned.
    async fn request(&mut self, request: &WorkerRequest<'_>) -> Result<WorkerReply, GradingError> {
        if self.worker.is_none() {
            self.respawn().await?;
        }
        self.send(request).await
    }

    async fn respawn(&mut self) -> Result<(), GradingError> {
        tracing::warn!(roots = self.roots.len(), "Replacing sandbox worker");
        metrics::WORKER_RESPAWNS.inc();
        self.worker = Some(Worker::spawn(&self.config)?);

        let roots = self.roots.clone();
        for (ns, code) in &roots {
            let replay = WorkerRequest::Exec {
                ns: *ns,
                base: None,
                code: code.as_str(),
            };
            let reply = self.send(&replay).await?;
            if !reply.ok {
                return Err(GradingError::Execution(format!(
                    "replaying {} failed: {}",
                    ns,
                    reply.error_text()
                )));
            }
        }
        Ok(())
    }

    async fn send(&mut self, request: &WorkerRequest<'_>) -> Result<WorkerReply, GradingError> {
        self.next_request += 1;
        let id = self.next_request;
        let line = request
            .to_line(id)
            .map_err(|e| GradingError::Protocol(e.to_string()))?;

        let budget = self.config.timeout;
        let worker = self
            .worker
            .as_mut()
            .ok_or_else(|| GradingError::WorkerUnavailable("no live worker".to_string()))?;

        let exchanged = timeout(budget, worker.exchange(&line)).await;

        let raw = match exchanged {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(op = request.op(), error = %e, "Sandbox worker lost");
                self.abandon();
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    op = request.op(),
                    budget_secs = budget.as_secs_f64(),
                    "Snippet timed out, abandoning worker"
                );
                metrics::SNIPPET_TIMEOUTS.inc();
                self.abandon();
                return Err(GradingError::ExecutionTimeout(budget));
            }
        };

        let reply: WorkerReply = match serde_json::from_str(&raw) {
            Ok(reply) => reply,
            Err(e) => {
                self.abandon();
                return Err(GradingError::Protocol(format!("unreadable reply: {e}")));
            }
        };
        if reply.id != id {
            self.abandon();
            return Err(GradingError::Protocol(format!(
                "reply {} does not answer request {}",
                reply.id, id
            )));
        }
        if !reply.stdout.is_empty() {
            tracing::trace!(op = request.op(), stdout = %reply.stdout, "Snippet output");
        }
        Ok(reply)
    }

    fn abandon(&mut self) {
        // Dropping the worker kills the process and removes its scratch dir
        self.worker = None;
    }
}

impl Drop for PythonSession {
    fn drop(&mut self) {
        metrics::ACTIVE_SESSIONS.dec();
    }
}

#[async_trait]
impl SnippetExecutor for PythonSession {
    async fn execute(
        &mut self,
        code: &str,
        base: Option<NamespaceId>,
    ) -> Result<Namespace, GradingError> {
        let ns = NamespaceId(self.handle());
        let reply = self.request(&WorkerRequest::Exec { ns, base, code }).await?;
        if !reply.ok {
            return Err(GradingError::Execution(reply.error_text()));
        }
        if base.is_none() {
            self.roots.push((ns, code.to_string()));
        }
        Ok(Namespace {
            id: ns,
            bindings: reply.bindings,
        })
    }

    async fn instantiate(
        &mut self,
        namespace: NamespaceId,
        class_name: &str,
        init: Option<NamespaceId>,
    ) -> Result<ObjectId, GradingError> {
        let obj = ObjectId(self.handle());
        let reply = self
            .request(&WorkerRequest::New {
                ns: namespace,
                class: class_name,
                init,
                obj,
            })
            .await?;
        if !reply.ok {
            return Err(GradingError::Construction(reply.error_text()));
        }
        Ok(obj)
    }

    async fn invoke(
        &mut self,
        object: ObjectId,
        method: &str,
        kwargs: NamespaceId,
    ) -> Result<Value, GradingError> {
        let reply = self
            .request(&WorkerRequest::Call {
                obj: object,
                method,
                args: kwargs,
            })
            .await?;
        if !reply.ok {
            return Err(GradingError::Invocation(reply.error_text()));
        }
        reply
            .value
            .ok_or_else(|| GradingError::Protocol("call reply carries no value".to_string()))
    }
}
