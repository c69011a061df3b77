use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use strand_core::error::Result;
use strand_core::types::{EventKind, RunResult, StepStatus, WorkflowEvent};

use super::manager::RunManager;
use crate::runner::RunHandle;

/// Step-level transition mirrored into run history.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRunRecord {
    pub step_id: String,
    pub status: StepStatus,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Recorder of run outcomes (a database, a log, ...).
pub trait RunHistory: Send + Sync + 'static {
    fn update_step(&self, run_id: &str, record: StepRunRecord) -> BoxFuture<'_, Result<()>>;

    fn complete_run(
        &self,
        run_id: &str,
        state: &HashMap<String, Value>,
    ) -> BoxFuture<'_, Result<()>>;

    fn fail_run(&self, run_id: &str, error: &str) -> BoxFuture<'_, Result<()>>;
}

/// Bridges a run's event stream into the [`RunManager`] and an optional
/// [`RunHistory`].
#[derive(Clone)]
pub struct RunPublisher {
    manager: Arc<RunManager>,
    history: Option<Arc<dyn RunHistory>>,
}

impl RunPublisher {
    pub fn new(manager: Arc<RunManager>) -> Self {
        Self {
            manager,
            history: None,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn RunHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn manager(&self) -> &Arc<RunManager> {
        &self.manager
    }

    /// Record a run that could not start.
    pub async fn reject(&self, run_id: &str, error: &str) {
        error!(run_id = %run_id, error = %error, "Run failed to start");
        if let Some(history) = &self.history {
            if let Err(e) = history.fail_run(run_id, error).await {
                warn!(run_id = %run_id, error = %e, "Failed to record run failure");
            }
        }
        self.manager.fail(run_id, error).await;
    }

    /// Drain `handle` to exhaustion, in order, then complete the run.
    ///
    /// The run must already be registered with the manager.
    pub async fn publish(&self, run_id: &str, handle: RunHandle) -> Option<RunResult> {
        let RunHandle {
            mut events,
            result,
            ..
        } = handle;

        let mut first_error: Option<String> = None;
        while let Some(mut event) = events.recv().await {
            if event.kind == EventKind::StepError && first_error.is_none() {
                first_error = event
                    .payload
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            if event.kind == EventKind::StepStarted {
                event
                    .payload
                    .insert("started_at".into(), json!(Utc::now().timestamp_millis()));
            }
            self.track(run_id, &event).await;
            self.manager
                .append(
                    run_id,
                    event.kind.as_str(),
                    Some(event.step_id),
                    event.payload,
                )
                .await;
        }

        let outcome = match result.await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.reject(run_id, "run ended without a result").await;
                return None;
            }
        };

        let status = if outcome.succeeded() { "completed" } else { "failed" };
        info!(run_id = %run_id, session_id = %outcome.session_id, status, "Run published");

        if let Some(history) = &self.history {
            let recorded = if outcome.succeeded() {
                history.complete_run(run_id, &outcome.state).await
            } else {
                let reason = first_error.unwrap_or_else(|| {
                    format!("run did not finish; failed steps: {:?}", outcome.failed_steps())
                });
                history.fail_run(run_id, &reason).await
            };
            if let Err(e) = recorded {
                warn!(run_id = %run_id, error = %e, "Failed to record run outcome");
            }
        }
        self.manager
            .complete(run_id, done_payload(run_id, status, &outcome))
            .await;
        Some(outcome)
    }

    async fn track(&self, run_id: &str, event: &WorkflowEvent) {
        let Some(history) = &self.history else {
            return;
        };
        let status = match event.kind {
            EventKind::StepStarted => StepStatus::Running,
            EventKind::StepCompleted => StepStatus::Completed,
            EventKind::StepError => StepStatus::Error,
            EventKind::StepSkipped => StepStatus::Skipped,
            EventKind::StepWaiting => StepStatus::Waiting,
            _ => return,
        };
        let record = StepRunRecord {
            step_id: event.step_id.clone(),
            status,
            at: event.timestamp,
            error: event
                .payload
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        if let Err(e) = history.update_step(run_id, record).await {
            warn!(run_id = %run_id, step_id = %event.step_id, error = %e, "Failed to record step transition");
        }
    }
}

fn done_payload(run_id: &str, status: &str, outcome: &RunResult) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("status".into(), json!(status));
    payload.insert("session_id".into(), json!(outcome.session_id.0));
    payload.insert("state".into(), json!(outcome.state));
    payload.insert("run_id".into(), json!(run_id));
    let failed = outcome.failed_steps();
    if !failed.is_empty() {
        payload.insert("failed_steps".into(), json!(failed));
    }
    payload
}
