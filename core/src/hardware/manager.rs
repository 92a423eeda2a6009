use std::sync::{Arc, Mutex, MutexGuard};

use crate::events::{Event, EventSink};
use crate::hardware::receiver::{
    HealthState, ReceiverBackend, ReceiverUnit, Role, SampleBlock,
};
use crate::{CoreError, CoreResult};

/// Exclusive, time-boxed borrow of one receiver.
///
/// Not `Clone`: holding the handle is holding the unit. The generation
/// counter lets a forcibly-released unit be re-leased without a stale
/// handle being able to free it later.
#[derive(Debug)]
pub struct LeaseHandle {
    unit_id: usize,
    generation: u64,
    role: Role,
}

impl LeaseHandle {
    pub fn unit_id(&self) -> usize {
        self.unit_id
    }

    pub fn role(&self) -> &Role {
        &self.role
    }
}

struct Slot {
    unit: ReceiverUnit,
    leased: bool,
    generation: u64,
}

/// Single source of truth for receiver ownership.
///
/// Every component acquires and releases units through the manager; nothing
/// else may hold device state. Routine health transitions go to the log;
/// faults and recoveries are also emitted as [`Event::UnitHealth`].
pub struct ResourceManager {
    backend: Arc<dyn ReceiverBackend>,
    slots: Mutex<Vec<Slot>>,
    sink: Arc<dyn EventSink>,
}

impl ResourceManager {
    pub fn new(backend: Arc<dyn ReceiverBackend>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            backend,
            slots: Mutex::new(Vec::new()),
            sink,
        }
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Query the transport and (re)build the unit table.
    ///
    /// Zero devices is a valid outcome and returns an empty list; only a
    /// transport failure is an error.
    pub fn enumerate(&self) -> CoreResult<Vec<ReceiverUnit>> {
        let descriptors = self.backend.enumerate()?;
        let mut slots = self.slots();
        *slots = descriptors
            .into_iter()
            .enumerate()
            .map(|(id, descriptor)| Slot {
                unit: ReceiverUnit {
                    id,
                    center_freq_hz: 0.0,
                    gain_db: 0.0,
                    role: None,
                    health: HealthState::Idle,
                    descriptor,
                },
                leased: false,
                generation: 0,
            })
            .collect();
        log::info!("enumerated {} receiver unit(s)", slots.len());
        Ok(slots.iter().map(|slot| slot.unit.clone()).collect())
    }

    /// Exclusive acquisition of an idle unit for the given role.
    pub fn acquire(&self, role: Role) -> CoreResult<LeaseHandle> {
        let mut slots = self.slots();
        let mut saw_faulted = false;
        for slot in slots.iter_mut() {
            if slot.leased {
                continue;
            }
            if slot.unit.health == HealthState::Faulted {
                saw_faulted = true;
                continue;
            }
            slot.leased = true;
            slot.generation += 1;
            slot.unit.role = Some(role.clone());
            log::debug!("unit {} leased for {}", slot.unit.id, role);
            return Ok(LeaseHandle {
                unit_id: slot.unit.id,
                generation: slot.generation,
                role,
            });
        }
        if saw_faulted {
            Err(CoreError::ResourceFaulted(role.to_string()))
        } else {
            Err(CoreError::ResourceBusy(role.to_string()))
        }
    }

    /// Idempotent release; the unit returns to `Idle` unless faulted.
    pub fn release(&self, handle: LeaseHandle) {
        self.release_inner(handle.unit_id, Some(handle.generation));
    }

    /// Forced release used when a worker misses its stop deadline.
    pub fn release_unit(&self, unit_id: usize) {
        self.release_inner(unit_id, None);
    }

    fn release_inner(&self, unit_id: usize, generation: Option<u64>) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(unit_id) {
            if let Some(generation) = generation {
                if slot.generation != generation {
                    return;
                }
            }
            if slot.leased {
                slot.leased = false;
                slot.unit.role = None;
                if slot.unit.health != HealthState::Faulted {
                    slot.unit.health = HealthState::Idle;
                }
                log::debug!("unit {unit_id} released");
            }
        }
    }

    /// Retune a leased unit. Out-of-range frequencies fail without touching
    /// the hardware; an I/O failure faults the unit.
    pub fn tune(&self, lease: &LeaseHandle, freq_hz: f64, gain_db: f64) -> CoreResult<()> {
        {
            let mut slots = self.slots();
            let slot = Self::leased_slot(&mut slots, lease)?;
            let descriptor = &slot.unit.descriptor;
            if freq_hz < descriptor.min_freq_hz || freq_hz > descriptor.max_freq_hz {
                return Err(CoreError::Tune {
                    unit: lease.unit_id,
                    reason: format!(
                        "frequency {freq_hz} Hz outside [{}, {}]",
                        descriptor.min_freq_hz, descriptor.max_freq_hz
                    ),
                });
            }
            slot.unit.health = HealthState::Tuning;
        }
        match self.backend.tune(lease.unit_id, freq_hz, gain_db) {
            Ok(()) => {
                let mut slots = self.slots();
                if let Some(slot) = slots.get_mut(lease.unit_id) {
                    slot.unit.center_freq_hz = freq_hz;
                    slot.unit.gain_db = gain_db;
                }
                Ok(())
            }
            Err(err) => {
                self.mark_faulted(lease.unit_id, &err.to_string());
                Err(CoreError::Tune {
                    unit: lease.unit_id,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Read `count` IQ samples from a leased unit. An I/O failure faults it.
    pub fn sample(&self, lease: &LeaseHandle, count: usize) -> CoreResult<SampleBlock> {
        {
            let mut slots = self.slots();
            let slot = Self::leased_slot(&mut slots, lease)?;
            slot.unit.health = HealthState::Sampling;
        }
        match self.backend.read_samples(lease.unit_id, count) {
            Ok(block) => Ok(block),
            Err(err) => {
                self.mark_faulted(lease.unit_id, &err.to_string());
                Err(CoreError::Io {
                    unit: lease.unit_id,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Read one integration window worth of IQ samples.
    pub fn sample_window(&self, lease: &LeaseHandle, seconds: f64) -> CoreResult<SampleBlock> {
        let rate = {
            let mut slots = self.slots();
            Self::leased_slot(&mut slots, lease)?.unit.descriptor.sample_rate_hz
        };
        let count = ((rate * seconds).round() as usize).max(1);
        self.sample(lease, count)
    }

    /// Mark a unit faulted; it is skipped by `acquire` until a successful
    /// `reprobe`.
    pub fn mark_faulted(&self, unit_id: usize, reason: &str) {
        {
            let mut slots = self.slots();
            match slots.get_mut(unit_id) {
                Some(slot) => slot.unit.health = HealthState::Faulted,
                None => return,
            }
        }
        log::warn!("unit {unit_id} faulted: {reason}");
        self.sink.emit(&Event::UnitHealth {
            unit: unit_id,
            health: HealthState::Faulted,
            detail: reason.to_string(),
        });
    }

    /// Try to bring a faulted unit back into service.
    pub fn reprobe(&self, unit_id: usize) -> CoreResult<()> {
        self.backend.probe(unit_id)?;
        {
            let mut slots = self.slots();
            match slots.get_mut(unit_id) {
                Some(slot) if slot.unit.health == HealthState::Faulted => {
                    slot.unit.health = HealthState::Idle;
                }
                Some(_) => return Ok(()),
                None => {
                    return Err(CoreError::Io {
                        unit: unit_id,
                        reason: "unknown unit".into(),
                    })
                }
            }
        }
        log::info!("unit {unit_id} recovered by reprobe");
        self.sink.emit(&Event::UnitHealth {
            unit: unit_id,
            health: HealthState::Idle,
            detail: "reprobe succeeded".into(),
        });
        Ok(())
    }

    /// Snapshot of every unit for status reporting.
    pub fn status(&self) -> Vec<ReceiverUnit> {
        self.slots().iter().map(|slot| slot.unit.clone()).collect()
    }

    pub fn leased_count(&self) -> usize {
        self.slots().iter().filter(|slot| slot.leased).count()
    }

    /// Units that an `acquire` call could currently hand out.
    pub fn available_count(&self) -> usize {
        self.slots()
            .iter()
            .filter(|slot| !slot.leased && slot.unit.health != HealthState::Faulted)
            .count()
    }

    fn leased_slot<'a>(
        slots: &'a mut MutexGuard<'_, Vec<Slot>>,
        lease: &LeaseHandle,
    ) -> CoreResult<&'a mut Slot> {
        let slot = slots.get_mut(lease.unit_id).ok_or(CoreError::Io {
            unit: lease.unit_id,
            reason: "unknown unit".into(),
        })?;
        if !slot.leased || slot.generation != lease.generation {
            return Err(CoreError::Io {
                unit: lease.unit_id,
                reason: "stale lease".into(),
            });
        }
        Ok(slot)
    }
}
