use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use sweepcore::prelude::{Event, EventSink};

/// Appends every event as one JSON line.
pub struct JsonlSink {
    file: Mutex<File>,
}

impl JsonlSink {
    pub fn create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path_ref)
            .with_context(|| format!("opening event log {}", path_ref.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, event: &Event) {
        let line = event.to_json();
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writeln!(file, "{line}") {
            log::warn!("event log write failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweepcore::prelude::ModeState;

    #[test]
    fn events_land_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = JsonlSink::create(&path).unwrap();
        sink.emit(&Event::ModeChanged {
            from: ModeState::ParallelScan,
            to: ModeState::Transitioning,
        });
        sink.emit(&Event::DfUnavailable {
            frequency_hz: 146.0e6,
            available: 1,
        });
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"kind\":\"mode_changed\""));
    }
}
