use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL event log.
///
/// - default fields are `type`, `trace_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
///
/// A writer without a path keeps events in memory only, which is what tests and the
/// one-shot CLI without `--events` use.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: Option<PathBuf>,
    trace_id: String,
    recent: Mutex<Vec<Value>>,
}

const RECENT_EVENTS_LIMIT: usize = 256;

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, trace_id: impl Into<String>) -> Self {
        Self::build(Some(path.into()), trace_id.into())
    }

    pub fn in_memory(trace_id: impl Into<String>) -> Self {
        Self::build(None, trace_id.into())
    }

    fn build(path: Option<PathBuf>, trace_id: String) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path,
                trace_id,
                recent: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn new_trace_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn trace_id(&self) -> &str {
        &self.inner.trace_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "trace_id".to_string(),
            Value::String(self.inner.trace_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }
        let event = Value::Object(event);

        let mut recent = self
            .inner
            .recent
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        if let Some(path) = self.inner.path.as_deref() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let line = serde_json::to_string(&event)?;
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }
        if recent.len() == RECENT_EVENTS_LIMIT {
            recent.remove(0);
        }
        recent.push(event.clone());

        Ok(event)
    }

    /// Emits and swallows write failures; logging never fails a page action.
    pub fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.emit(event_type, payload) {
            eprintln!("event log write failed ({event_type}): {err:#}");
        }
    }

    /// Types of the events emitted so far, oldest first.
    pub fn recent_types(&self) -> Vec<String> {
        self.inner
            .recent
            .lock()
            .map(|recent| {
                recent
                    .iter()
                    .filter_map(|event| event.get("type").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn recent(&self) -> Vec<Value> {
        self.inner
            .recent
            .lock()
            .map(|recent| recent.clone())
            .unwrap_or_default()
    }
}

pub fn payload(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
