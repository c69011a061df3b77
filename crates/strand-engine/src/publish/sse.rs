//! Server-sent-event framing of buffered run events.

use std::sync::Arc;

use futures::stream::{self, Stream};
use serde_json::{Map, Value};

use super::manager::{EventRecord, RunManager};

/// Reserved event type of the terminal record.
pub const DONE_EVENT: &str = "done";

/// Frame one buffered event. The sequence number doubles as the SSE id, so
/// a reconnecting client can resume with `Last-Event-ID`.
pub fn render_event(record: &EventRecord) -> String {
    let mut data = Map::new();
    if let Some(step_id) = &record.step_id {
        data.insert("step_id".into(), Value::String(step_id.clone()));
    }
    data.extend(record.payload.clone());
    format!(
        "id: {}\nevent: {}\ndata: {}\n\n",
        record.seq,
        record.kind,
        Value::Object(data)
    )
}

/// Frame the terminal record.
pub fn render_done(payload: &Map<String, Value>) -> String {
    format!(
        "event: {}\ndata: {}\n\n",
        DONE_EVENT,
        Value::Object(payload.clone())
    )
}

/// First sequence to replay for a client that last saw `last_event_id`.
pub fn resume_from(last_event_id: Option<&str>) -> usize {
    last_event_id
        .and_then(|id| id.trim().parse::<usize>().ok())
        .map_or(0, |seq| seq + 1)
}

struct Follow {
    manager: Arc<RunManager>,
    run_id: String,
    next_seq: usize,
    finished: bool,
}

/// Live SSE frames for a run: buffered events from `from_seq`, then new
/// events as they arrive, ending with the `done` frame.
///
/// Returns `None` when the run is not tracked.
pub async fn follow(
    manager: Arc<RunManager>,
    run_id: &str,
    from_seq: usize,
) -> Option<impl Stream<Item = String>> {
    if !manager.contains(run_id).await {
        return None;
    }
    let start = Follow {
        manager,
        run_id: run_id.to_string(),
        next_seq: from_seq,
        finished: false,
    };

    Some(stream::unfold(start, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            let mut sub = state.manager.subscribe(&state.run_id, state.next_seq).await?;
            if !sub.events.is_empty() {
                state.next_seq += sub.events.len();
                let mut frames: String = sub.events.iter().map(render_event).collect();
                if let Some(done) = &sub.done {
                    frames.push_str(&render_done(done));
                    state.finished = true;
                }
                return Some((frames, state));
            }
            if let Some(done) = &sub.done {
                state.finished = true;
                return Some((render_done(done), state));
            }
            // Run dropped from the manager while waiting.
            sub.changed.changed().await.ok()?;
        }
    }))
}
