use crate::events::{Event, EventSink};
use crate::hardware::HealthState;

/// Routes the event stream to the `log` facade.
///
/// Samples are chatty and go to debug; anything an operator acts on goes to
/// info or warn.
#[derive(Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::Sample(sample) => log::debug!(
                "sample {:.4} MHz {:.1} dBm (unit {})",
                sample.frequency_hz / 1.0e6,
                sample.power_dbm,
                sample.receiver_id
            ),
            Event::Anomaly(anomaly) => log::info!(
                "anomaly {:?} {:.4} MHz +{:.1} dB score {:.1}",
                anomaly.category,
                anomaly.frequency_hz / 1.0e6,
                anomaly.power_delta_db,
                anomaly.priority_score
            ),
            Event::Bearing(bearing) => log::info!(
                "bearing {:.1} deg at {:.4} MHz (confidence {:.2}, SNR {:.1} dB)",
                bearing.degrees,
                bearing.frequency_hz / 1.0e6,
                bearing.confidence,
                bearing.snr_db
            ),
            Event::ModeChanged { from, to } => log::info!("mode {from} -> {to}"),
            Event::UnitHealth {
                unit,
                health,
                detail,
            } => {
                if *health == HealthState::Faulted {
                    log::warn!("unit {unit} faulted: {detail}");
                } else {
                    log::info!("unit {unit} now {health:?}: {detail}");
                }
            }
            Event::PartialCoverage { band, unit, detail } => {
                log::warn!("band {band} coverage lost (unit {unit:?}): {detail}")
            }
            Event::DfUnavailable {
                frequency_hz,
                available,
            } => log::warn!(
                "DF at {:.4} MHz unavailable with {available} element(s)",
                frequency_hz / 1.0e6
            ),
            Event::Calibration(report) => log::info!(
                "calibration at {:.4} MHz: coherence {:.3}",
                report.frequency_hz / 1.0e6,
                report.coherence
            ),
        }
    }
}
