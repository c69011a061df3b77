use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often finished runs are checked against the retention TTL.
const GC_INTERVAL: Duration = Duration::from_secs(30);

/// One buffered event. `seq` is the position in the run's buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: usize,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub payload: Map<String, Value>,
}

struct RunEntry {
    events: Vec<EventRecord>,
    done: Option<Map<String, Value>>,
    completed_at: Option<Instant>,
    /// Bumped on every append and on completion.
    changed: watch::Sender<u64>,
}

impl RunEntry {
    fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            events: Vec::new(),
            done: None,
            completed_at: None,
            changed,
        }
    }

    fn notify(&self) {
        self.changed.send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// Buffered events from a requested sequence onward, plus a wakeup handle.
pub struct Subscription {
    pub events: Vec<EventRecord>,
    /// The terminal payload, once the run is done.
    pub done: Option<Map<String, Value>>,
    /// Changes whenever the run appends an event or completes.
    pub changed: watch::Receiver<u64>,
}

/// In-memory per-run event buffers with subscriber wakeups.
///
/// Finished runs stay available for replay until their TTL elapses.
pub struct RunManager {
    runs: Mutex<HashMap<String, RunEntry>>,
    ttl: Duration,
}

impl RunManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Start tracking a run. Re-registering an id resets its buffer.
    pub async fn register(&self, run_id: &str) {
        self.runs
            .lock()
            .await
            .insert(run_id.to_string(), RunEntry::new());
    }

    pub async fn contains(&self, run_id: &str) -> bool {
        self.runs.lock().await.contains_key(run_id)
    }

    /// Append an event and wake subscribers. Returns the assigned sequence,
    /// or `None` for an unknown or finished run.
    pub async fn append(
        &self,
        run_id: &str,
        kind: &str,
        step_id: Option<String>,
        payload: Map<String, Value>,
    ) -> Option<usize> {
        let mut runs = self.runs.lock().await;
        let entry = runs.get_mut(run_id)?;
        if entry.done.is_some() {
            return None;
        }
        let seq = entry.events.len();
        entry.events.push(EventRecord {
            seq,
            kind: kind.to_string(),
            step_id,
            payload,
        });
        entry.notify();
        Some(seq)
    }

    /// Mark a run done with its terminal payload.
    pub async fn complete(&self, run_id: &str, payload: Map<String, Value>) {
        let mut runs = self.runs.lock().await;
        if let Some(entry) = runs.get_mut(run_id) {
            entry.done = Some(payload);
            entry.completed_at = Some(Instant::now());
            entry.notify();
        }
    }

    /// Mark a run done with a failure message.
    pub async fn fail(&self, run_id: &str, error: &str) {
        let mut payload = Map::new();
        payload.insert("status".into(), Value::String("failed".into()));
        payload.insert("error".into(), Value::String(error.to_string()));
        payload.insert("run_id".into(), Value::String(run_id.to_string()));
        self.complete(run_id, payload).await;
    }

    /// Events from `from_seq` onward, the done payload if any, and a
    /// receiver that changes on the next append or completion.
    pub async fn subscribe(&self, run_id: &str, from_seq: usize) -> Option<Subscription> {
        let runs = self.runs.lock().await;
        let entry = runs.get(run_id)?;
        Some(Subscription {
            events: entry.events.get(from_seq..).map(<[_]>::to_vec).unwrap_or_default(),
            done: entry.done.clone(),
            changed: entry.changed.subscribe(),
        })
    }

    /// Drop finished runs older than the TTL. Returns how many were removed.
    pub async fn collect_expired(&self) -> usize {
        let mut runs = self.runs.lock().await;
        let before = runs.len();
        let ttl = self.ttl;
        runs.retain(|_, entry| match entry.completed_at {
            Some(at) => at.elapsed() <= ttl,
            None => true,
        });
        before - runs.len()
    }

    /// Periodically collect expired runs until `cancel` fires.
    pub fn spawn_gc(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GC_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = manager.collect_expired().await;
                        if removed > 0 {
                            debug!(removed, "Collected expired run buffers");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}
