//! Background task dispatcher
//!
//! Named tasks run on a worker pool with at-least-once execution, a
//! per-task retry policy and result persistence in the task_runs table.
//! Only `ExternalSystem` failures are retried; every other error is fatal
//! for the task. Shutdown cancels the intake and drains in-flight work.

use polaris_common::{Error, Result};
use sqlx::SqlitePool;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type TaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type TaskFn = Box<dyn FnMut() -> TaskFuture + Send>;

/// Retry behavior for one task
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Two automatic retries, the CRM sync contract
    pub fn crm_sync() -> Self {
        Self {
            max_attempts: 3,
            ..Default::default()
        }
    }

    /// One attempt only, for operations that must not repeat
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

struct QueuedTask {
    run_id: Uuid,
    name: String,
    policy: RetryPolicy,
    work: TaskFn,
}

/// Handle for dispatching tasks; cheap to clone
#[derive(Clone)]
pub struct TaskDispatcher {
    tx: mpsc::Sender<QueuedTask>,
    db: SqlitePool,
}

impl TaskDispatcher {
    /// Spawn the worker pool. Workers stop accepting new tasks when the
    /// shutdown token fires but finish the task they are running.
    pub fn start(db: SqlitePool, workers: usize, shutdown: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel::<QueuedTask>(256);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for worker_id in 0..workers.max(1) {
            let rx = rx.clone();
            let db = db.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            task = rx.recv() => task,
                        }
                    };
                    let Some(task) = task else { break };
                    run_task(&db, task).await;
                }
                tracing::debug!(worker_id, "Task worker stopped");
            });
        }

        Self { tx, db }
    }

    /// Queue a named task. The run id is persisted before enqueueing so
    /// the task is observable even if the process dies immediately.
    pub async fn dispatch<F, Fut>(
        &self,
        name: &str,
        policy: RetryPolicy,
        mut work: F,
    ) -> Result<Uuid>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO task_runs (id, task_name, status, attempts, created_at, updated_at)
            VALUES (?, ?, 'QUEUED', 0, ?, ?)
            "#,
        )
        .bind(run_id.to_string())
        .bind(name)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        let queued = QueuedTask {
            run_id,
            name: name.to_string(),
            policy,
            work: Box::new(move || Box::pin(work()) as TaskFuture),
        };

        self.tx
            .send(queued)
            .await
            .map_err(|_| Error::Internal("task queue closed".to_string()))?;

        Ok(run_id)
    }

    pub async fn task_status(&self, run_id: Uuid) -> Result<Option<(String, i64)>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT status, attempts FROM task_runs WHERE id = ?")
                .bind(run_id.to_string())
                .fetch_optional(&self.db)
                .await?;
        Ok(row)
    }
}

async fn run_task(db: &SqlitePool, mut task: QueuedTask) {
    let _ = set_status(db, task.run_id, "RUNNING", 0, None).await;

    let mut attempts = 0u32;
    loop {
        attempts += 1;

        let outcome = match tokio::time::timeout(task.policy.timeout, (task.work)()).await {
            Ok(result) => result,
            // Timing out is a retriable failure
            Err(_) => Err(Error::external(
                "task",
                format!("timed out after {:?}", task.policy.timeout),
            )),
        };

        match outcome {
            Ok(()) => {
                let _ = set_status(db, task.run_id, "DONE", attempts, None).await;
                tracing::info!(task = %task.name, attempts, "Task completed");
                return;
            }
            Err(e) if e.is_retriable() && attempts < task.policy.max_attempts => {
                let backoff = task.policy.base_backoff * 2u32.saturating_pow(attempts - 1);
                tracing::warn!(
                    task = %task.name,
                    attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Task failed, retrying"
                );
                let _ = set_status(db, task.run_id, "RUNNING", attempts, Some(&e.to_string())).await;
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                tracing::error!(task = %task.name, attempts, error = %e, "Task failed");
                let _ = set_status(db, task.run_id, "FAILED", attempts, Some(&e.to_string())).await;
                return;
            }
        }
    }
}

async fn set_status(
    db: &SqlitePool,
    run_id: Uuid,
    status: &str,
    attempts: u32,
    last_error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE task_runs SET status = ?, attempts = ?, last_error = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status)
    .bind(attempts as i64)
    .bind(last_error)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(run_id.to_string())
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polaris_common::db::init_in_memory;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn wait_for_terminal(dispatcher: &TaskDispatcher, run_id: Uuid) -> String {
        for _ in 0..200 {
            if let Some((status, _)) = dispatcher.task_status(run_id).await.unwrap() {
                if status == "DONE" || status == "FAILED" {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task did not reach a terminal status");
    }

    #[tokio::test]
    async fn successful_task_lands_done() {
        let pool = init_in_memory().await.unwrap();
        let dispatcher = TaskDispatcher::start(pool, 2, CancellationToken::new());

        let run_id = dispatcher
            .dispatch("noop", RetryPolicy::default(), || async { Ok(()) })
            .await
            .unwrap();

        assert_eq!(wait_for_terminal(&dispatcher, run_id).await, "DONE");
    }

    #[tokio::test]
    async fn external_failures_retry_until_success() {
        let pool = init_in_memory().await.unwrap();
        let dispatcher = TaskDispatcher::start(pool, 1, CancellationToken::new());

        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_task = calls.clone();
        let run_id = dispatcher
            .dispatch(
                "flaky",
                RetryPolicy {
                    max_attempts: 3,
                    base_backoff: Duration::from_millis(1),
                    timeout: Duration::from_secs(5),
                },
                move || {
                    let calls = calls_in_task.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(Error::external("crm", "flaky"))
                        } else {
                            Ok(())
                        }
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(wait_for_terminal(&dispatcher, run_id).await, "DONE");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn validation_failures_are_fatal() {
        let pool = init_in_memory().await.unwrap();
        let dispatcher = TaskDispatcher::start(pool, 1, CancellationToken::new());

        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_task = calls.clone();
        let run_id = dispatcher
            .dispatch("bad-input", RetryPolicy::default(), move || {
                let calls = calls_in_task.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Validation("schema violation".to_string()))
                }
            })
            .await
            .unwrap();

        assert_eq!(wait_for_terminal(&dispatcher, run_id).await, "FAILED");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
