//! Synthetic RF front end. Emitters are plane waves with a bearing, so a
//! scenario exercises the whole chain from sweep to bearing estimate.

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use sweepcore::df::music::SPEED_OF_LIGHT;
use sweepcore::prelude::{
    ArrayGeometry, CoreError, CoreResult, ReceiverBackend, ReceiverDescriptor, SampleBlock,
};

const SIM_RATE_HZ: f64 = 96_000.0;

/// One transmitter in the scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimEmitter {
    pub frequency_hz: f64,
    pub power_dbm: f64,
    /// True bearing from the array, degrees clockwise from north.
    pub bearing_deg: f64,
    /// Scenario time at which the emitter keys up.
    pub start_s: f64,
}

impl Default for SimEmitter {
    fn default() -> Self {
        Self {
            frequency_hz: 146.52e6,
            power_dbm: -35.0,
            bearing_deg: 120.0,
            start_s: 0.0,
        }
    }
}

struct SimState {
    tuned_hz: Vec<f64>,
    round_read: Vec<bool>,
    clock_s: f64,
    prev_round_s: f64,
    rng: StdRng,
}

/// Software stand-in for the receiver pool.
///
/// All units share one capture clock: a unit reading twice starts a new
/// round, and every unit reading inside a round gets the same start time.
/// That models the shared hardware trigger the DF path depends on.
pub struct SimBackend {
    descriptors: Vec<ReceiverDescriptor>,
    emitters: Vec<SimEmitter>,
    geometry: ArrayGeometry,
    phase_errors: Vec<f64>,
    noise_amplitude: f64,
    state: Mutex<SimState>,
}

impl SimBackend {
    pub fn new(
        units: usize,
        emitters: Vec<SimEmitter>,
        geometry: ArrayGeometry,
        phase_errors: Vec<f64>,
        noise_dbm: f64,
        seed: u64,
    ) -> Arc<Self> {
        let descriptors = (0..units)
            .map(|index| ReceiverDescriptor {
                serial: format!("SIM{index:04}"),
                min_freq_hz: 24.0e6,
                max_freq_hz: 1.8e9,
                sample_rate_hz: SIM_RATE_HZ,
            })
            .collect();
        Arc::new(Self {
            descriptors,
            emitters,
            geometry,
            phase_errors,
            noise_amplitude: 10.0_f64.powf(noise_dbm / 20.0),
            state: Mutex::new(SimState {
                tuned_hz: vec![0.0; units],
                round_read: vec![false; units],
                clock_s: 0.0,
                prev_round_s: 0.0,
                rng: StdRng::seed_from_u64(seed),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Phase seen by one element for a plane wave from this emitter.
    fn element_phase(&self, unit: usize, emitter: &SimEmitter) -> f64 {
        let [x, y] = self
            .geometry
            .elements
            .get(unit)
            .copied()
            .unwrap_or([0.0, 0.0]);
        let k = 2.0 * std::f64::consts::PI * emitter.frequency_hz / SPEED_OF_LIGHT;
        let theta = emitter.bearing_deg.to_radians();
        let geometric = k * theta.sin() * x + k * theta.cos() * y;
        geometric + self.phase_errors.get(unit).copied().unwrap_or(0.0)
    }
}

impl ReceiverBackend for SimBackend {
    fn enumerate(&self) -> CoreResult<Vec<ReceiverDescriptor>> {
        Ok(self.descriptors.clone())
    }

    fn tune(&self, index: usize, freq_hz: f64, _gain_db: f64) -> CoreResult<()> {
        let mut state = self.state();
        match state.tuned_hz.get_mut(index) {
            Some(tuned) => {
                *tuned = freq_hz;
                Ok(())
            }
            None => Err(CoreError::Io {
                unit: index,
                reason: "unknown unit".into(),
            }),
        }
    }

    fn read_samples(&self, index: usize, count: usize) -> CoreResult<SampleBlock> {
        let mut state = self.state();
        if index >= state.tuned_hz.len() {
            return Err(CoreError::Io {
                unit: index,
                reason: "unknown unit".into(),
            });
        }
        if state.round_read[index] {
            state.clock_s += state.prev_round_s;
            for flag in &mut state.round_read {
                *flag = false;
            }
        }
        state.round_read[index] = true;
        state.prev_round_s = count as f64 / SIM_RATE_HZ;
        let start = state.clock_s;
        let tuned = state.tuned_hz[index];

        let mut iq = vec![Complex64::new(0.0, 0.0); count];
        for sample in &mut iq {
            *sample = Complex64::new(
                state.rng.gen::<f64>() - 0.5,
                state.rng.gen::<f64>() - 0.5,
            ) * self.noise_amplitude;
        }
        for emitter in &self.emitters {
            if start < emitter.start_s {
                continue;
            }
            let offset = emitter.frequency_hz - tuned;
            if offset.abs() > SIM_RATE_HZ / 2.0 {
                continue;
            }
            let amplitude = 10.0_f64.powf(emitter.power_dbm / 20.0);
            let element = self.element_phase(index, emitter);
            for (n, sample) in iq.iter_mut().enumerate() {
                let t = start + n as f64 / SIM_RATE_HZ;
                let phase = 2.0 * std::f64::consts::PI * offset * t + element;
                *sample += Complex64::from_polar(amplitude, phase);
            }
        }
        Ok(SampleBlock {
            iq,
            sample_rate_hz: SIM_RATE_HZ,
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
