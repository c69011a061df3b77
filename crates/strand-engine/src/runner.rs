//! Execution runner: walks a validated graph one step at a time.
//!
//! Each run is a spawned task that owns the [`RunState`] exclusively.
//! Progress goes out on an unbounded event stream; the [`RunResult`] is sent
//! on a oneshot channel only after every event sender has been dropped, so a
//! consumer that drains the stream first always sees every event before the
//! outcome.

use std::collections::{HashMap, HashSet};

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use strand_core::error::{Result, StrandError};
use strand_core::types::{EventKind, RunResult, SessionId, StepStatus, WorkflowEvent};
use strand_core::workflow::{EdgeDefinition, WorkflowDefinition};

use crate::condition;
use crate::events::EventEmitter;
use crate::graph::Graph;
use crate::state::RunState;
use crate::steps::{StepContext, StepExecutors};

/// Handles to one in-flight run.
pub struct RunHandle {
    pub session_id: SessionId,
    pub events: mpsc::UnboundedReceiver<WorkflowEvent>,
    pub result: oneshot::Receiver<RunResult>,
}

impl RunHandle {
    /// Drain the event stream, then read the result.
    ///
    /// `None` means the run task went away without reporting.
    pub async fn collect(mut self) -> (Vec<WorkflowEvent>, Option<RunResult>) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        (events, self.result.await.ok())
    }
}

/// Starts workflow runs against a shared set of step executors.
#[derive(Clone)]
pub struct Runner {
    executors: StepExecutors,
}

impl Runner {
    pub fn new(executors: StepExecutors) -> Self {
        Self { executors }
    }

    pub fn executors(&self) -> &StepExecutors {
        &self.executors
    }

    /// Validate the graph and spawn the run.
    ///
    /// Graph errors are returned here, before any event is emitted.
    /// `inputs` maps intake step ids to their values.
    pub fn start(
        &self,
        workflow: &WorkflowDefinition,
        inputs: HashMap<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<RunHandle> {
        self.start_session(SessionId::new(), workflow, inputs, cancel)
    }

    /// Like [`Runner::start`] with a caller-chosen session id.
    pub fn start_session(
        &self,
        session_id: SessionId,
        workflow: &WorkflowDefinition,
        inputs: HashMap<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<RunHandle> {
        let graph = Graph::build(workflow)?;
        let (emitter, events) = EventEmitter::channel();
        let (result_tx, result) = oneshot::channel();

        info!(session_id = %session_id, workflow = %workflow.name, steps = graph.len(), "Starting run");

        let walk = Walk::new(
            graph,
            RunState::with_inputs(inputs),
            self.executors.clone(),
            session_id.clone(),
            emitter,
            cancel,
        );
        tokio::spawn(async move {
            let outcome = walk.run().await;
            let _ = result_tx.send(outcome);
        });

        Ok(RunHandle {
            session_id,
            events,
            result,
        })
    }
}

/// Progress of one loop edge.
struct LoopProgress {
    edge: EdgeDefinition,
    body: HashSet<String>,
    /// Passes started so far, the first included.
    pass: usize,
    finished: bool,
}

impl LoopProgress {
    fn limit(&self) -> usize {
        self.edge
            .loop_spec
            .as_ref()
            .map_or(1, |spec| spec.max_iterations.max(1))
    }

    fn exit_when(&self) -> &str {
        self.edge
            .loop_spec
            .as_ref()
            .map_or("", |spec| spec.exit_when.as_str())
    }
}

struct Walk {
    graph: Graph,
    state: RunState,
    executors: StepExecutors,
    session_id: SessionId,
    events: EventEmitter,
    cancel: CancellationToken,
    statuses: HashMap<String, StepStatus>,
    loops: Vec<LoopProgress>,
    /// A step has already failed because of cancellation.
    cancel_reported: bool,
}

impl Walk {
    fn new(
        graph: Graph,
        state: RunState,
        executors: StepExecutors,
        session_id: SessionId,
        events: EventEmitter,
        cancel: CancellationToken,
    ) -> Self {
        let statuses = graph
            .topological_order()
            .iter()
            .map(|id| (id.clone(), StepStatus::Pending))
            .collect();
        let loops = graph
            .back_edges()
            .iter()
            .map(|edge| {
                let body: HashSet<String> = graph.loop_body(edge).into_iter().collect();
                if body.is_empty() {
                    warn!(from = %edge.from, to = %edge.to, "Loop edge does not close a cycle; ignoring");
                }
                LoopProgress {
                    finished: body.is_empty(),
                    edge: edge.clone(),
                    body,
                    pass: 1,
                }
            })
            .collect();
        Self {
            graph,
            state,
            executors,
            session_id,
            events,
            cancel,
            statuses,
            loops,
            cancel_reported: false,
        }
    }

    async fn run(mut self) -> RunResult {
        while let Some(step_id) = self.next_ready() {
            if self.cancel.is_cancelled() {
                if !self.cancel_reported {
                    self.fail_step(&step_id, StrandError::Cancelled);
                }
                info!(session_id = %self.session_id, "Run cancelled; no further steps dispatched");
                break;
            }
            self.dispatch(&step_id).await;
            self.close_loops(&step_id);
        }

        let Walk {
            state,
            statuses,
            session_id,
            events,
            ..
        } = self;
        drop(events);

        let failed = statuses.values().filter(|s| **s == StepStatus::Error).count();
        info!(session_id = %session_id, failed, "Run finished");
        RunResult {
            session_id,
            state: state.outputs(),
            steps: statuses,
        }
    }

    fn status(&self, id: &str) -> StepStatus {
        self.statuses.get(id).copied().unwrap_or(StepStatus::Pending)
    }

    /// First pending step, in topological order, whose parents are all
    /// terminal and that is not waiting on an unfinished loop upstream.
    fn next_ready(&self) -> Option<String> {
        self.graph
            .topological_order()
            .iter()
            .find(|id| {
                self.status(id) == StepStatus::Pending
                    && self
                        .graph
                        .parents(id)
                        .iter()
                        .all(|p| self.status(p).is_terminal())
                    && !self.held_by_loop(id)
            })
            .cloned()
    }

    fn held_by_loop(&self, id: &str) -> bool {
        self.loops.iter().any(|lp| {
            !lp.finished
                && !lp.body.contains(id)
                && self.graph.parents(id).iter().any(|p| lp.body.contains(p))
        })
    }

    /// Current pass of the innermost unfinished loop containing `id`.
    fn iteration(&self, id: &str) -> Option<usize> {
        self.loops
            .iter()
            .filter(|lp| lp.body.contains(id))
            .min_by_key(|lp| lp.body.len())
            .map(|lp| lp.pass)
    }

    async fn dispatch(&mut self, step_id: &str) {
        let Some(step) = self.graph.node(step_id).cloned() else {
            return;
        };

        if let Some(parent) = self
            .graph
            .parents(step_id)
            .iter()
            .find(|p| self.status(p).blocks_dependents())
        {
            debug!(step_id = %step_id, parent = %parent, "Skipping step after upstream failure");
            self.events.emit_json(
                step_id,
                EventKind::StepSkipped,
                json!({ "reason": format!("dependency {} did not complete", parent) }),
            );
            self.statuses.insert(step_id.to_string(), StepStatus::Skipped);
            return;
        }

        let mut started = serde_json::Map::new();
        started.insert("type".into(), json!(step.kind.as_str()));
        if let Some(pass) = self.iteration(step_id) {
            started.insert("iteration".into(), json!(pass));
        }
        self.statuses.insert(step_id.to_string(), StepStatus::Running);
        self.events.emit(step_id, EventKind::StepStarted, started);
        info!(step_id = %step_id, kind = %step.kind, "Step started");

        let ctx = StepContext {
            session_id: self.session_id.clone(),
            step_id: step_id.to_string(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        };
        let outcome = tokio::select! {
            result = self.executors.execute(&step, &self.state, &ctx) => result,
            _ = self.cancel.cancelled() => Err(StrandError::Cancelled),
        };

        match outcome {
            Ok(value) => {
                self.state.set(step_id, value.clone());
                self.statuses.insert(step_id.to_string(), StepStatus::Completed);
                self.events
                    .emit_json(step_id, EventKind::StepCompleted, json!({ "output": value }));
                info!(step_id = %step_id, "Step completed");
            }
            Err(e) => self.fail_step(step_id, e),
        }
    }

    fn fail_step(&mut self, step_id: &str, e: StrandError) {
        if self.cancel.is_cancelled() {
            self.cancel_reported = true;
        }
        let e = e.in_step(step_id);
        error!(step_id = %step_id, error = %e, "Step failed");
        self.statuses.insert(step_id.to_string(), StepStatus::Error);
        self.events
            .emit_json(step_id, EventKind::StepError, json!({ "error": e.to_string() }));
    }

    /// After `step_id` settles, decide every loop it closes: re-enter the
    /// body for another pass, or mark the loop finished.
    fn close_loops(&mut self, step_id: &str) {
        let completed = self.status(step_id) == StepStatus::Completed;
        for i in 0..self.loops.len() {
            let lp = &self.loops[i];
            if lp.finished || lp.edge.from != step_id {
                continue;
            }
            let again = completed
                && lp.pass < lp.limit()
                && !condition::evaluate(lp.exit_when(), &self.state);

            if !again {
                debug!(from = %lp.edge.from, to = %lp.edge.to, passes = lp.pass, "Loop finished");
                self.loops[i].finished = true;
                continue;
            }

            let body = lp.body.clone();
            self.loops[i].pass += 1;
            debug!(from = %step_id, to = %self.loops[i].edge.to, pass = self.loops[i].pass, "Re-entering loop");
            for id in &body {
                self.statuses.insert(id.clone(), StepStatus::Pending);
            }
            // Loops nested inside this body start over.
            for (j, inner) in self.loops.iter_mut().enumerate() {
                if j != i
                    && !inner.body.is_empty()
                    && inner.body.len() < body.len()
                    && inner.body.is_subset(&body)
                {
                    inner.finished = false;
                    inner.pass = 1;
                }
            }
        }
    }
}
