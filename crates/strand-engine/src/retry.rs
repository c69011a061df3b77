//! Whole-run retry with exponential backoff.
//!
//! Attempts share one session id and one event stream: every attempt's
//! events are forwarded in order, and the last attempt's result is the
//! run's result.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use strand_core::config::RetryConfig;
use strand_core::error::Result;
use strand_core::types::{EventKind, RunResult, SessionId, WorkflowEvent};
use strand_core::workflow::WorkflowDefinition;

use crate::runner::{RunHandle, Runner};

const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "rate_limit",
    "rate limit",
    "too many requests",
    "429",
    "500",
    "502",
    "503",
    "504",
    "connection reset",
    "connection refused",
    "eof",
    "overloaded",
    "capacity",
];

/// Whether an error message looks transient.
pub fn is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Delay before retry number `attempt + 1`: exponential, capped, with
    /// 0.8x to 1.2x jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = if self.config.backoff_factor < 1.0 {
            1.0
        } else {
            self.config.backoff_factor
        };
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ms = (self.config.initial_backoff_ms as f64 * factor.powi(exponent))
            .min(self.config.max_backoff_ms as f64);
        let jitter = 0.8 + rand::random::<f64>() * 0.4;
        Duration::from_millis((ms * jitter) as u64)
    }

    /// Start a run that is re-attempted while it fails transiently.
    ///
    /// Graph errors surface immediately, as with [`Runner::start`].
    pub fn start(
        &self,
        runner: &Runner,
        workflow: &WorkflowDefinition,
        inputs: HashMap<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<RunHandle> {
        let session_id = SessionId::new();
        let first = runner.start_session(session_id.clone(), workflow, inputs.clone(), cancel.clone())?;

        let (tx, events) = mpsc::unbounded_channel();
        let (result_tx, result) = oneshot::channel();
        let attempts = Attempts {
            policy: self.clone(),
            runner: runner.clone(),
            workflow: workflow.clone(),
            inputs,
            session_id: session_id.clone(),
            cancel,
        };
        tokio::spawn(async move {
            if let Some(outcome) = attempts.drive(first, tx).await {
                let _ = result_tx.send(outcome);
            }
        });

        Ok(RunHandle {
            session_id,
            events,
            result,
        })
    }
}

struct Attempts {
    policy: RetryPolicy,
    runner: Runner,
    workflow: WorkflowDefinition,
    inputs: HashMap<String, serde_json::Value>,
    session_id: SessionId,
    cancel: CancellationToken,
}

impl Attempts {
    /// Forward attempts until one is final. The forwarding sender is
    /// dropped before the outcome is returned.
    async fn drive(
        self,
        mut current: RunHandle,
        tx: mpsc::UnboundedSender<WorkflowEvent>,
    ) -> Option<RunResult> {
        let max_retries = self.policy.max_retries();
        let mut attempt = 0u32;
        loop {
            let mut transient = false;
            while let Some(event) = current.events.recv().await {
                if event.kind == EventKind::StepError {
                    transient |= event
                        .payload
                        .get("error")
                        .and_then(|e| e.as_str())
                        .is_some_and(is_retryable);
                }
                let _ = tx.send(event);
            }
            let outcome = current.result.await.ok()?;

            if outcome.succeeded()
                || !transient
                || attempt >= max_retries
                || self.cancel.is_cancelled()
            {
                if attempt > 0 {
                    info!(session_id = %self.session_id, attempts = attempt + 1, succeeded = outcome.succeeded(), "Retried run finished");
                }
                return Some(outcome);
            }

            let backoff = self.policy.backoff(attempt);
            warn!(
                session_id = %self.session_id,
                attempt = attempt + 1,
                max_retries,
                backoff_ms = backoff.as_millis() as u64,
                failed = ?outcome.failed_steps(),
                "Retrying run after transient failure"
            );
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.cancel.cancelled() => return Some(outcome),
            }

            attempt += 1;
            current = match self.runner.start_session(
                self.session_id.clone(),
                &self.workflow,
                self.inputs.clone(),
                self.cancel.clone(),
            ) {
                Ok(handle) => handle,
                Err(e) => {
                    error!(session_id = %self.session_id, error = %e, "Retry attempt failed to start");
                    return Some(outcome);
                }
            };
        }
    }
}
