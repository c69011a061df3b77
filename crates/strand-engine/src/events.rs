use serde_json::{Map, Value};
use tokio::sync::mpsc;

use strand_core::types::{EventKind, WorkflowEvent};

/// Sending half of a run's event stream.
///
/// Sends never block; a dropped receiver silently discards events.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self { tx }
    }

    /// Create an emitter and the receiving end of its stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, step_id: &str, kind: EventKind, payload: Map<String, Value>) {
        let _ = self.tx.send(WorkflowEvent::new(step_id, kind, payload));
    }

    /// Emit an event whose payload is a JSON object literal.
    pub fn emit_json(&self, step_id: &str, kind: EventKind, payload: Value) {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        self.emit(step_id, kind, payload);
    }
}
