//! Task-span capture for chrome://tracing visualization.
//!
//! Each pool owns one [`TraceSink`]; every worker stamps a span into it
//! after each task it runs. The sink is a bounded in-memory buffer: spans
//! past the capacity are counted rather than stored, so a long-lived pool
//! cannot grow without bound. The contents can be written out as a Chrome
//! Trace Event file readable by chrome://tracing or ui.perfetto.dev, with
//! one lane per worker. Only compiled with the `chrome-trace` feature.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default bound on retained spans per sink.
const DEFAULT_CAPACITY: usize = 65_536;

/// Which task shape a worker executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Object { object_id: u32 },
    Value,
}

impl TaskKind {
    fn label(&self) -> &'static str {
        match self {
            TaskKind::Object { .. } => "object_task",
            TaskKind::Value => "value_task",
        }
    }
}

/// One completed task execution, timed relative to the sink's epoch.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpan {
    pub worker: usize,
    pub kind: TaskKind,
    pub start_us: u64,
    pub duration_us: u64,
}

/// Bounded collector of task spans, shared by every worker of a pool.
pub struct TraceSink {
    epoch: Instant,
    capacity: usize,
    spans: Mutex<Vec<TaskSpan>>,
    dropped: AtomicUsize,
}

impl TraceSink {
    pub fn new() -> Self {
        TraceSink::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        TraceSink {
            epoch: Instant::now(),
            capacity,
            spans: Mutex::new(Vec::new()),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Stamps one finished task. A full sink drops the span and only
    /// counts it.
    pub fn record(&self, worker: usize, kind: TaskKind, started: Instant, duration: Duration) {
        let mut spans = self.spans.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if spans.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        spans.push(TaskSpan {
            worker,
            kind,
            start_us: started.saturating_duration_since(self.epoch).as_micros() as u64,
            duration_us: duration.as_micros() as u64,
        });
    }

    /// Number of retained spans.
    pub fn len(&self) -> usize {
        self.spans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spans discarded because the sink was already at capacity.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The retained spans, in completion order.
    pub fn spans(&self) -> Vec<TaskSpan> {
        self.spans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Writes the spans as a Chrome Trace Event JSON object
    /// (`{"traceEvents": [...]}`): one complete event per task, the worker
    /// index as the thread lane, and the object id carried in `args`.
    pub fn write_chrome_trace<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let spans = self.spans();
        writeln!(out, "{{\"traceEvents\": [")?;
        for (index, span) in spans.iter().enumerate() {
            let comma = if index + 1 == spans.len() { "" } else { "," };
            write!(
                out,
                "  {{\"name\": \"{}\", \"cat\": \"task\", \"ph\": \"X\", \"ts\": {}, \"dur\": {}, \"pid\": 1, \"tid\": {}",
                span.kind.label(),
                span.start_us,
                span.duration_us,
                span.worker
            )?;
            match span.kind {
                TaskKind::Object { object_id } => {
                    writeln!(out, ", \"args\": {{\"object_id\": {}}}}}{}", object_id, comma)?;
                }
                TaskKind::Value => writeln!(out, "}}{}", comma)?,
            }
        }
        writeln!(out, "]}}")
    }

    /// Writes the chrome trace to `path`.
    pub fn export_to_file(&self, path: &str) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_chrome_trace(&mut writer)?;
        writer.flush()
    }
}

impl Default for TraceSink {
    fn default() -> Self {
        TraceSink::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_completion_order() {
        let sink = TraceSink::new();
        sink.record(0, TaskKind::Value, Instant::now(), Duration::from_micros(40));
        sink.record(
            1,
            TaskKind::Object { object_id: 9 },
            Instant::now(),
            Duration::from_micros(250),
        );

        let spans = sink.spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].kind, TaskKind::Value);
        assert_eq!(spans[0].worker, 0);
        assert_eq!(spans[0].duration_us, 40);
        assert_eq!(spans[1].kind, TaskKind::Object { object_id: 9 });
        assert!(spans[1].start_us >= spans[0].start_us);
    }

    #[test]
    fn test_capacity_bound_counts_drops() {
        let sink = TraceSink::with_capacity(4);
        for worker in 0..6 {
            sink.record(worker, TaskKind::Value, Instant::now(), Duration::ZERO);
        }

        // The first four spans survive; the overflow is only counted.
        assert_eq!(sink.len(), 4);
        assert_eq!(sink.dropped(), 2);
        assert_eq!(sink.spans().last().map(|span| span.worker), Some(3));

        sink.record(9, TaskKind::Value, Instant::now(), Duration::ZERO);
        assert_eq!(sink.len(), 4);
        assert_eq!(sink.dropped(), 3);
    }

    #[test]
    fn test_chrome_export_parses() {
        let sink = TraceSink::new();
        sink.record(
            2,
            TaskKind::Object { object_id: 7 },
            Instant::now(),
            Duration::from_micros(120),
        );
        sink.record(0, TaskKind::Value, Instant::now(), Duration::from_micros(40));

        let path = std::env::temp_dir().join(format!("taskpool-trace-{}.json", std::process::id()));
        let path_str = path.to_str().expect("utf-8 temp path");
        sink.export_to_file(path_str).expect("export trace");

        let raw = std::fs::read_to_string(&path).expect("read trace file");
        let _ = std::fs::remove_file(&path);

        let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        let events = parsed["traceEvents"].as_array().expect("traceEvents array");
        assert_eq!(events.len(), 2);

        assert_eq!(events[0]["name"], "object_task");
        assert_eq!(events[0]["ph"], "X");
        assert_eq!(events[0]["tid"], 2);
        assert_eq!(events[0]["dur"], 120);
        assert_eq!(events[0]["args"]["object_id"], 7);

        assert_eq!(events[1]["name"], "value_task");
        assert!(events[1].get("args").is_none());
        assert!(events[1]["ts"].as_u64().is_some());
    }

    #[test]
    fn test_empty_sink_exports_valid_json() {
        let sink = TraceSink::new();
        let mut out = Vec::new();
        sink.write_chrome_trace(&mut out).expect("write trace");

        let parsed: serde_json::Value =
            serde_json::from_slice(&out).expect("valid json for empty sink");
        assert_eq!(parsed["traceEvents"].as_array().map(Vec::len), Some(0));
    }
}
