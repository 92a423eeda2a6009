use serde::Serialize;
use std::sync::Mutex;

use crate::events::{Event, EventSink};
use crate::hardware::HealthState;
use crate::mode::ModeState;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub samples: u64,
    pub anomalies: u64,
    pub bearings: u64,
    pub faults: u64,
    pub mode_switches: u64,
    pub coverage_warnings: u64,
}

/// Counts the event stream; cheap enough to hang off every deployment.
#[derive(Default)]
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        match self.inner.lock() {
            Ok(inner) => inner.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_inner(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        match self.inner.lock() {
            Ok(mut inner) => apply(&mut inner),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

impl EventSink for MetricsRecorder {
    fn emit(&self, event: &Event) {
        self.with_inner(|metrics| match event {
            Event::Sample(_) => metrics.samples += 1,
            Event::Anomaly(_) => metrics.anomalies += 1,
            Event::Bearing(_) => metrics.bearings += 1,
            Event::UnitHealth { health, .. } => {
                if *health == HealthState::Faulted {
                    metrics.faults += 1;
                }
            }
            Event::ModeChanged { to, .. } => {
                if *to == ModeState::DirectionFinding {
                    metrics.mode_switches += 1;
                }
            }
            Event::PartialCoverage { .. } | Event::DfUnavailable { .. } => {
                metrics.coverage_warnings += 1;
            }
            Event::Calibration(_) => {}
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_track_the_stream() {
        let recorder = MetricsRecorder::new();
        recorder.emit(&Event::ModeChanged {
            from: ModeState::Transitioning,
            to: ModeState::DirectionFinding,
        });
        recorder.emit(&Event::ModeChanged {
            from: ModeState::DirectionFinding,
            to: ModeState::Transitioning,
        });
        recorder.emit(&Event::UnitHealth {
            unit: 2,
            health: HealthState::Faulted,
            detail: "test".into(),
        });
        recorder.emit(&Event::UnitHealth {
            unit: 2,
            health: HealthState::Idle,
            detail: "recovered".into(),
        });

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.mode_switches, 1);
        assert_eq!(snapshot.faults, 1);
        assert_eq!(snapshot.samples, 0);
    }
}
