//! Scriptable in-memory backend used by the engine tests.

use num_complex::Complex64;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::hardware::receiver::{ReceiverBackend, ReceiverDescriptor, SampleBlock};
use crate::{CoreError, CoreResult};

const MOCK_RATE_HZ: f64 = 96_000.0;

struct MockState {
    tuned_hz: Vec<f64>,
    round_read: Vec<bool>,
    clock_s: f64,
    prev_round_s: f64,
}

/// Deterministic backend: emitters are pure complex tones, faults and hangs
/// are injected per unit.
pub struct MockBackend {
    descriptors: Vec<ReceiverDescriptor>,
    emitters: Mutex<Vec<(f64, f64)>>,
    fail_tune: Mutex<HashSet<usize>>,
    hang_read: Mutex<Option<(usize, Duration)>>,
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new(units: usize) -> Arc<Self> {
        Self::with_emitters(units, Vec::new())
    }

    /// `emitters` are `(frequency_hz, power_dbm)` pairs; any unit tuned
    /// within half a sample rate of an emitter hears it.
    pub fn with_emitters(units: usize, emitters: Vec<(f64, f64)>) -> Arc<Self> {
        let descriptors = (0..units)
            .map(|index| ReceiverDescriptor {
                serial: format!("MOCK{index:04}"),
                min_freq_hz: 24.0e6,
                max_freq_hz: 1.8e9,
                sample_rate_hz: MOCK_RATE_HZ,
            })
            .collect();
        Arc::new(Self {
            descriptors,
            emitters: Mutex::new(emitters),
            fail_tune: Mutex::new(HashSet::new()),
            hang_read: Mutex::new(None),
            state: Mutex::new(MockState {
                tuned_hz: vec![0.0; units],
                round_read: vec![false; units],
                clock_s: 0.0,
                prev_round_s: 0.0,
            }),
        })
    }

    pub fn fail_tune_on(&self, index: usize) {
        self.lock(&self.fail_tune).insert(index);
    }

    pub fn clear_tune_failures(&self) {
        self.lock(&self.fail_tune).clear();
    }

    /// Make one unit's next reads block, simulating a wedged device.
    pub fn hang_reads_on(&self, index: usize, duration: Duration) {
        *self.lock(&self.hang_read) = Some((index, duration));
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ReceiverBackend for MockBackend {
    fn enumerate(&self) -> CoreResult<Vec<ReceiverDescriptor>> {
        Ok(self.descriptors.clone())
    }

    fn tune(&self, index: usize, freq_hz: f64, _gain_db: f64) -> CoreResult<()> {
        if self.lock(&self.fail_tune).contains(&index) {
            return Err(CoreError::Io {
                unit: index,
                reason: "injected tune failure".into(),
            });
        }
        let mut state = self.lock(&self.state);
        if index >= state.tuned_hz.len() {
            return Err(CoreError::Io {
                unit: index,
                reason: "unknown unit".into(),
            });
        }
        state.tuned_hz[index] = freq_hz;
        Ok(())
    }

    fn read_samples(&self, index: usize, count: usize) -> CoreResult<SampleBlock> {
        // copy out so the lock is not held across the sleep
        let hang = *self.lock(&self.hang_read);
        if let Some((hang_index, duration)) = hang {
            if hang_index == index {
                std::thread::sleep(duration);
            }
        }
        let mut state = self.lock(&self.state);
        if index >= state.tuned_hz.len() {
            return Err(CoreError::Io {
                unit: index,
                reason: "unknown unit".into(),
            });
        }
        // Shared capture clock: the clock only advances when a unit reads a
        // second time, so units reading once each see an identical start.
        if state.round_read[index] {
            state.clock_s += state.prev_round_s;
            for flag in &mut state.round_read {
                *flag = false;
            }
        }
        state.round_read[index] = true;
        state.prev_round_s = count as f64 / MOCK_RATE_HZ;
        let start = state.clock_s;
        let tuned = state.tuned_hz[index];
        drop(state);

        let mut iq = vec![Complex64::new(0.0, 0.0); count];
        for &(freq_hz, power_dbm) in self.lock(&self.emitters).iter() {
            let offset = freq_hz - tuned;
            if offset.abs() > MOCK_RATE_HZ / 2.0 {
                continue;
            }
            let amplitude = 10.0_f64.powf(power_dbm / 20.0);
            for (n, sample) in iq.iter_mut().enumerate() {
                let t = start + n as f64 / MOCK_RATE_HZ;
                let phase = 2.0 * std::f64::consts::PI * offset * t;
                *sample += Complex64::from_polar(amplitude, phase);
            }
        }
        Ok(SampleBlock {
            iq,
            sample_rate_hz: MOCK_RATE_HZ,
            start_timestamp: start,
        })
    }

    fn probe(&self, index: usize) -> CoreResult<()> {
        if index < self.descriptors.len() {
            Ok(())
        } else {
            Err(CoreError::Io {
                unit: index,
                reason: "unknown unit".into(),
            })
        }
    }
}
