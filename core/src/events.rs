use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::detection::Anomaly;
use crate::df::{Bearing, CalibrationReport};
use crate::hardware::HealthState;
use crate::mode::ModeState;
use crate::scanning::SpectrumSample;

/// Outbound record handed to the logging/persistence collaborator.
///
/// The core never writes to the console or to disk itself; everything an
/// operator or a downstream store needs arrives through this enum.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Sample(SpectrumSample),
    Anomaly(Anomaly),
    Bearing(Bearing),
    ModeChanged {
        from: ModeState,
        to: ModeState,
    },
    UnitHealth {
        unit: usize,
        health: HealthState,
        detail: String,
    },
    /// A band assignment lost its worker for the rest of the epoch.
    PartialCoverage {
        band: String,
        unit: Option<usize>,
        detail: String,
    },
    /// A direction-finding attempt was aborted before the array formed.
    DfUnavailable {
        frequency_hz: f64,
        available: usize,
    },
    Calibration(CalibrationReport),
}

impl Event {
    /// One-line JSON rendering for append-only sinks.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| format!("{{\"kind\":\"unserializable\",\"error\":\"{err}\"}}"))
    }
}

/// Append-only consumer of core events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Forwards every event to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &Event) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Buffers events in memory. Used by tests and small embedders that want to
/// inspect the stream after the fact.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count_matching(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.snapshot().iter().filter(|event| predicate(event)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fanout_reaches_every_sink() {
        let first = Arc::new(RecordingSink::new());
        let second = Arc::new(RecordingSink::new());
        let mut fanout = FanoutSink::new();
        fanout.push(first.clone());
        fanout.push(second.clone());

        fanout.emit(&Event::DfUnavailable {
            frequency_hz: 146.52e6,
            available: 1,
        });

        assert_eq!(first.snapshot().len(), 1);
        assert_eq!(second.snapshot().len(), 1);
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = Event::DfUnavailable {
            frequency_hz: 433.92e6,
            available: 0,
        };
        let json = event.to_json();
        assert!(json.contains("\"kind\":\"df_unavailable\""));
        assert!(json.contains("\"available\":0"));
    }
}
