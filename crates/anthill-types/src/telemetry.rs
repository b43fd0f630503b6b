use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A frame whose duration exceeded the long-frame threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongFrame {
    /// Frame start, epoch milliseconds.
    pub time: i64,
    pub duration: f64,
    /// Extra context the client attached (object counts and the like).
    #[serde(flatten)]
    pub context: Map<String, Value>,
}

/// Structured error or warning event, stored exactly as the client sent it.
///
/// Locally recorded events carry `time` (epoch milliseconds) and `message`;
/// client records may omit either or attach anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventRecord(pub Map<String, Value>);

impl EventRecord {
    pub fn new(time: i64, message: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("time".into(), Value::from(time));
        fields.insert("message".into(), Value::String(message.into()));
        Self(fields)
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.0.insert("stack".into(), Value::String(stack.into()));
        self
    }

    /// Event time in epoch milliseconds, if present and numeric.
    pub fn time(&self) -> Option<f64> {
        self.0.get("time").and_then(Value::as_f64)
    }

    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(Value::as_str)
    }
}

/// Running aggregate for one named function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionTiming {
    pub calls: u64,
    pub total_time: f64,
    /// Absent in records from clients that only track calls, total and max.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_time: Option<f64>,
    pub max_time: f64,
    #[serde(flatten)]
    pub context: Map<String, Value>,
}

impl FunctionTiming {
    pub fn first(duration_ms: f64) -> Self {
        Self {
            calls: 1,
            total_time: duration_ms,
            min_time: Some(duration_ms),
            max_time: duration_ms,
            context: Map::new(),
        }
    }

    pub fn record(&mut self, duration_ms: f64) {
        self.calls += 1;
        self.total_time += duration_ms;
        self.min_time = Some(self.min_time.map_or(duration_ms, |min| min.min(duration_ms)));
        self.max_time = self.max_time.max(duration_ms);
    }

    pub fn average_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_time / self.calls as f64
        }
    }
}

/// Immutable point-in-time capture of the recorder state.
///
/// Every field is required on the wire; empty containers are fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Capture time, epoch milliseconds.
    pub timestamp: i64,
    pub metrics: Map<String, Value>,
    pub long_frames: Vec<LongFrame>,
    pub errors: Vec<EventRecord>,
    pub warnings: Vec<EventRecord>,
    pub function_timings: BTreeMap<String, FunctionTiming>,
}

impl TelemetrySnapshot {
    pub fn empty(timestamp: i64) -> Self {
        Self {
            timestamp,
            metrics: Map::new(),
            long_frames: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            function_timings: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn browser_payload_parses_and_keeps_extra_fields() {
        let payload = json!({
            "timestamp": 1700000000000i64,
            "metrics": { "fps": [{ "time": 1, "value": 58.5 }], "antCount": 40 },
            "longFrames": [{ "time": 1699999999000i64, "duration": 142.5, "antCount": 40 }],
            "errors": [{ "time": 1699999999500i64, "message": "boom", "stack": null }],
            "warnings": [{ "time": 1699999999600i64, "message": "Long frame: 142.50ms" }],
            "functionTimings": {
                "Ant.update": { "calls": 3, "totalTime": 9.0, "lastStartTime": 12.5, "maxTime": 4.0 }
            }
        });

        let snapshot: TelemetrySnapshot = serde_json::from_value(payload).unwrap();
        assert_eq!(snapshot.long_frames[0].context["antCount"], json!(40));
        assert_eq!(snapshot.errors[0].message(), Some("boom"));
        assert_eq!(snapshot.errors[0].0["stack"], Value::Null);
        let timing = &snapshot.function_timings["Ant.update"];
        assert_eq!(timing.min_time, None);
        assert_eq!(timing.context["lastStartTime"], json!(12.5));
        assert_eq!(timing.average_ms(), 3.0);
    }

    #[test]
    fn loosely_shaped_client_records_survive_unchanged() {
        let payload = json!({
            "timestamp": 1700000000000i64,
            "metrics": {},
            "longFrames": [],
            "errors": [
                { "message": "no time at all" },
                { "time": 1234.5, "message": "fractional time", "stack": null }
            ],
            "warnings": [{ "time": 1699999999600i64 }],
            "functionTimings": {
                "Food.decay": { "calls": 1, "totalTime": 0.5, "lastStartTime": 3.25, "maxTime": 0.5 }
            }
        });

        let snapshot: TelemetrySnapshot = serde_json::from_value(payload.clone()).unwrap();
        assert_eq!(snapshot.errors[0].time(), None);
        assert_eq!(snapshot.errors[1].time(), Some(1234.5));
        assert_eq!(snapshot.warnings[0].message(), None);
        assert_eq!(serde_json::to_value(&snapshot).unwrap(), payload);
    }

    #[test]
    fn missing_top_level_field_is_rejected() {
        let payload = json!({
            "timestamp": 1,
            "metrics": {},
            "longFrames": [],
            "errors": [],
            "warnings": []
        });
        assert!(serde_json::from_value::<TelemetrySnapshot>(payload).is_err());
    }

    #[test]
    fn function_timing_aggregates() {
        let mut timing = FunctionTiming::first(4.0);
        timing.record(2.0);
        timing.record(6.0);
        assert_eq!(timing.calls, 3);
        assert_eq!(timing.total_time, 12.0);
        assert_eq!(timing.min_time, Some(2.0));
        assert_eq!(timing.max_time, 6.0);
        assert_eq!(timing.average_ms(), 4.0);
    }
}
