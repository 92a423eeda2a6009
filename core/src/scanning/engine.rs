//! Parallel sweep engine. One worker task per band assignment, all feeding
//! a single bounded sample queue owned by the epoch handle.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ScanConfig;
use crate::events::{Event, EventSink};
use crate::hardware::{LeaseHandle, ResourceManager, Role};
use crate::math::{FftHelper, SpectralStats};
use crate::scanning::BandAssignment;
use crate::CoreResult;

/// One dwell measurement from a scan worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumSample {
    pub frequency_hz: f64,
    pub power_dbm: f64,
    /// Seconds on the backend capture clock.
    pub timestamp: f64,
    pub receiver_id: usize,
}

/// Live scan epoch. Workers run until the handle is passed back to
/// [`ScanEngine::stop_epoch`]; dropping it instead leaves leases held.
pub struct EpochHandle {
    stop_tx: watch::Sender<bool>,
    workers: Vec<(usize, JoinHandle<()>)>,
    samples: mpsc::Receiver<SpectrumSample>,
}

impl EpochHandle {
    pub fn samples(&mut self) -> &mut mpsc::Receiver<SpectrumSample> {
        &mut self.samples
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

pub struct ScanEngine {
    manager: Arc<ResourceManager>,
    sink: Arc<dyn EventSink>,
    config: ScanConfig,
}

impl ScanEngine {
    pub fn new(
        manager: Arc<ResourceManager>,
        sink: Arc<dyn EventSink>,
        config: ScanConfig,
    ) -> Self {
        Self {
            manager,
            sink,
            config,
        }
    }

    /// Lease one receiver per band and start the sweep workers.
    ///
    /// A band that cannot get a receiver is reported as partial coverage and
    /// skipped; the epoch starts with however many workers were staffed.
    pub fn start_epoch(&self, bands: &[BandAssignment]) -> EpochHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (sample_tx, samples) = mpsc::channel(self.config.queue_depth);
        let mut workers = Vec::new();
        for band in bands {
            let lease = match self.manager.acquire(Role::Scan(band.band_name.clone())) {
                Ok(lease) => lease,
                Err(err) => {
                    log::warn!("band {} unstaffed: {err}", band.band_name);
                    self.sink.emit(&Event::PartialCoverage {
                        band: band.band_name.clone(),
                        unit: None,
                        detail: err.to_string(),
                    });
                    continue;
                }
            };
            let unit_id = lease.unit_id();
            let worker = run_worker(
                self.manager.clone(),
                self.sink.clone(),
                self.config.clone(),
                band.clone(),
                lease,
                sample_tx.clone(),
                stop_rx.clone(),
            );
            workers.push((unit_id, tokio::spawn(worker)));
        }
        log::info!("scan epoch started with {} worker(s)", workers.len());
        EpochHandle {
            stop_tx,
            workers,
            samples,
        }
    }

    /// Stop every worker within the configured timeout.
    ///
    /// A worker that misses the deadline is abandoned: its unit is marked
    /// faulted and force-released so the next epoch or a DF grab never waits
    /// on wedged hardware.
    pub async fn stop_epoch(&self, handle: EpochHandle) {
        let EpochHandle {
            stop_tx,
            workers,
            samples,
        } = handle;
        drop(samples);
        let _ = stop_tx.send(true);
        let deadline = Instant::now() + Duration::from_secs_f64(self.config.stop_timeout_s);
        for (unit_id, mut join) in workers {
            if tokio::time::timeout_at(deadline, &mut join).await.is_err() {
                join.abort();
                self.manager
                    .mark_faulted(unit_id, "worker missed stop deadline");
                self.manager.release_unit(unit_id);
            }
        }
        log::info!("scan epoch stopped");
    }
}

async fn run_worker(
    manager: Arc<ResourceManager>,
    sink: Arc<dyn EventSink>,
    config: ScanConfig,
    band: BandAssignment,
    lease: LeaseHandle,
    sample_tx: mpsc::Sender<SpectrumSample>,
    stop_rx: watch::Receiver<bool>,
) {
    let mut fft = FftHelper::new(config.fft_size);
    let mut freq = band.start_hz;
    loop {
        if *stop_rx.borrow() {
            break;
        }
        match sweep_step(&manager, &mut fft, &config, &lease, freq) {
            Ok(sample) => {
                sink.emit(&Event::Sample(sample.clone()));
                if sample_tx.send(sample).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                sink.emit(&Event::PartialCoverage {
                    band: band.band_name.clone(),
                    unit: Some(lease.unit_id()),
                    detail: err.to_string(),
                });
                break;
            }
        }
        freq += band.step_hz;
        if freq > band.end_hz {
            freq = band.start_hz;
        }
        tokio::task::yield_now().await;
    }
    manager.release(lease);
}

fn sweep_step(
    manager: &ResourceManager,
    fft: &mut FftHelper,
    config: &ScanConfig,
    lease: &LeaseHandle,
    freq_hz: f64,
) -> CoreResult<SpectrumSample> {
    manager.tune(lease, freq_hz, config.gain_db)?;
    let block = manager.sample_window(lease, config.integration_window_s)?;
    let power_dbm = SpectralStats::peak_power_dbm(fft, &block.iq);
    Ok(SpectrumSample {
        frequency_hz: freq_hz,
        power_dbm,
        timestamp: block.start_timestamp,
        receiver_id: lease.unit_id(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::hardware::mock::MockBackend;
    use std::time::Instant as StdInstant;

    fn band(name: &str, start: f64, end: f64) -> BandAssignment {
        BandAssignment {
            band_name: name.into(),
            start_hz: start,
            end_hz: end,
            step_hz: 25.0e3,
            priority: 3,
        }
    }

    fn test_config() -> ScanConfig {
        ScanConfig {
            integration_window_s: 0.01,
            stop_timeout_s: 0.5,
            ..ScanConfig::default()
        }
    }

    fn engine_with(
        backend: Arc<MockBackend>,
        config: ScanConfig,
    ) -> (ScanEngine, Arc<ResourceManager>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let manager = Arc::new(ResourceManager::new(backend, sink.clone()));
        manager.enumerate().unwrap();
        let engine = ScanEngine::new(manager.clone(), sink.clone(), config);
        (engine, manager, sink)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn workers_produce_samples_from_a_tone() {
        let backend = MockBackend::with_emitters(1, vec![(144.0e6, -30.0)]);
        let (engine, _, _) = engine_with(backend, test_config());
        let mut epoch = engine.start_epoch(&[band("2m", 144.0e6, 144.05e6)]);
        assert_eq!(epoch.worker_count(), 1);

        let mut best = f64::NEG_INFINITY;
        for _ in 0..6 {
            let sample = epoch.samples().recv().await.unwrap();
            if (sample.frequency_hz - 144.0e6).abs() < 1.0 {
                best = best.max(sample.power_dbm);
            }
        }
        assert!((best + 30.0).abs() < 1.0, "peak was {best} dBm");
        engine.stop_epoch(epoch).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unstaffed_bands_report_partial_coverage() {
        let backend = MockBackend::new(4);
        let (engine, manager, sink) = engine_with(backend, test_config());
        manager.mark_faulted(3, "down for the test");
        let epoch = engine.start_epoch(&[
            band("a", 144.0e6, 145.0e6),
            band("b", 146.0e6, 147.0e6),
            band("c", 430.0e6, 431.0e6),
            band("d", 902.0e6, 903.0e6),
        ]);
        assert_eq!(epoch.worker_count(), 3);
        let unstaffed = sink.count_matching(|event| {
            matches!(event, Event::PartialCoverage { unit: None, .. })
        });
        assert_eq!(unstaffed, 1);
        engine.stop_epoch(epoch).await;
        assert_eq!(manager.leased_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_is_bounded_when_a_worker_hangs() {
        let backend = MockBackend::with_emitters(2, vec![(144.0e6, -30.0)]);
        let (engine, manager, _) = engine_with(backend.clone(), test_config());
        // unit 0 wedges on its very first read
        backend.hang_reads_on(0, Duration::from_secs(3));
        let mut epoch = engine.start_epoch(&[
            band("a", 144.0e6, 145.0e6),
            band("b", 146.0e6, 147.0e6),
        ]);
        // the healthy worker keeps the epoch alive
        let _ = epoch.samples().recv().await;

        let started = StdInstant::now();
        engine.stop_epoch(epoch).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(manager.leased_count(), 0);
        assert_eq!(
            manager.status()[0].health,
            crate::hardware::HealthState::Faulted
        );
    }
}
