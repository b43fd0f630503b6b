use std::{
    collections::{BTreeMap, VecDeque},
    time::Instant,
};

use anthill_types::{
    config::TelemetryConfig,
    telemetry::{EventRecord, FunctionTiming, LongFrame, TelemetrySnapshot},
    AnthillError, Result,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

/// Metric names the snapshot computes itself.
pub const RESERVED_METRICS: [&str; 4] = ["fps", "frameTime", "averageFrameTime", "frameCount"];

/// One entry of the rolling frame record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub time: i64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy)]
struct MetricSample {
    time: i64,
    value: f64,
}

/// Accumulates frame timings, events and function durations for the
/// current session. All sequences are capped at `max_history` entries.
#[derive(Debug)]
pub struct TelemetryRecorder {
    config: TelemetryConfig,
    frames: VecDeque<FrameSample>,
    frame_count: u64,
    long_frames: VecDeque<LongFrame>,
    errors: VecDeque<EventRecord>,
    warnings: VecDeque<EventRecord>,
    metrics: BTreeMap<String, VecDeque<MetricSample>>,
    function_timings: BTreeMap<String, FunctionTiming>,
}

impl TelemetryRecorder {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            frames: VecDeque::new(),
            frame_count: 0,
            long_frames: VecDeque::new(),
            errors: VecDeque::new(),
            warnings: VecDeque::new(),
            metrics: BTreeMap::new(),
            function_timings: BTreeMap::new(),
        }
    }

    pub fn record_frame(&mut self, duration_ms: f64, timestamp: i64) {
        let duration = sanitize(duration_ms);
        let cap = self.config.max_history;
        push_capped(
            &mut self.frames,
            FrameSample {
                time: timestamp,
                duration,
            },
            cap,
        );
        self.frame_count += 1;

        if duration > self.config.long_frame_threshold_ms {
            push_capped(
                &mut self.long_frames,
                LongFrame {
                    time: timestamp,
                    duration,
                    context: Map::new(),
                },
                cap,
            );
            self.record_warning(EventRecord::new(
                timestamp,
                format!("Long frame: {duration:.2}ms"),
            ));
        }
    }

    pub fn record_error(&mut self, event: EventRecord) {
        error!("[telemetry] {}", event.message().unwrap_or("<no message>"));
        push_capped(&mut self.errors, event, self.config.max_history);
    }

    pub fn record_warning(&mut self, event: EventRecord) {
        warn!("[telemetry] {}", event.message().unwrap_or("<no message>"));
        push_capped(&mut self.warnings, event, self.config.max_history);
    }

    pub fn record_function_timing(&mut self, name: &str, duration_ms: f64) {
        let duration = sanitize(duration_ms);
        match self.function_timings.get_mut(name) {
            Some(timing) => timing.record(duration),
            None => {
                self.function_timings
                    .insert(name.to_string(), FunctionTiming::first(duration));
            }
        }
    }

    /// Runs `f`, recording its wall-clock duration under `name`.
    pub fn time_function<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let output = f();
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        self.record_function_timing(name, elapsed);
        if elapsed > self.config.long_frame_threshold_ms {
            self.record_warning(EventRecord::new(
                Utc::now().timestamp_millis(),
                format!("Long execution: {name} took {elapsed:.2}ms"),
            ));
        }
        output
    }

    /// Records a named gauge such as an object count or heap size. Names in
    /// [`RESERVED_METRICS`] are refused.
    pub fn record_metric(&mut self, name: &str, value: f64, timestamp: i64) -> Result<()> {
        if RESERVED_METRICS.contains(&name) {
            return Err(AnthillError::Ops(format!(
                "metric name '{name}' is reserved for computed frame metrics"
            )));
        }
        let cap = self.config.max_history;
        let history = self.metrics.entry(name.to_string()).or_default();
        push_capped(
            history,
            MetricSample {
                time: timestamp,
                value: sanitize(value),
            },
            cap,
        );
        Ok(())
    }

    /// Mean FPS over the most recent `fps_window` frames.
    pub fn current_fps(&self) -> Option<f64> {
        let window = self.config.fps_window.min(self.frames.len());
        if window == 0 {
            return None;
        }
        let total: f64 = self.frames.iter().rev().take(window).map(|f| f.duration).sum();
        let mean = total / window as f64;
        (mean > 0.0).then(|| 1000.0 / mean)
    }

    pub fn frames(&self) -> impl Iterator<Item = &FrameSample> {
        self.frames.iter()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot_at(Utc::now().timestamp_millis())
    }

    /// Builds a snapshot without clearing accumulated state.
    pub fn snapshot_at(&self, timestamp: i64) -> TelemetrySnapshot {
        let mut metrics = Map::new();
        for (name, history) in &self.metrics {
            if let Some(latest) = history.back() {
                metrics.insert(name.clone(), json!(latest.value));
            }
        }

        let recent: Vec<&FrameSample> = {
            let skip = self.frames.len().saturating_sub(self.config.fps_window);
            self.frames.iter().skip(skip).collect()
        };
        let average_frame_time = if recent.is_empty() {
            0.0
        } else {
            recent.iter().map(|f| f.duration).sum::<f64>() / recent.len() as f64
        };
        let frame_time: Vec<Value> = recent
            .iter()
            .map(|f| json!({ "time": f.time, "value": f.duration }))
            .collect();

        metrics.insert("fps".into(), json!(self.current_fps().unwrap_or(0.0)));
        metrics.insert("frameTime".into(), Value::Array(frame_time));
        metrics.insert("averageFrameTime".into(), json!(average_frame_time));
        metrics.insert("frameCount".into(), json!(self.frame_count));

        TelemetrySnapshot {
            timestamp,
            metrics,
            long_frames: self.long_frames.iter().cloned().collect(),
            errors: self.errors.iter().cloned().collect(),
            warnings: self.warnings.iter().cloned().collect(),
            function_timings: self.function_timings.clone(),
        }
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, item: T, cap: usize) {
    queue.push_back(item);
    while queue.len() > cap {
        queue.pop_front();
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        0.0
    }
}
