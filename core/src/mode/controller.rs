//! The scan/DF mode controller.
//!
//! Owns the scan epoch, the anomaly engine, and the DF engine, and moves the
//! whole receiver pool between the two arrangements. All mode changes go
//! through here; components never reassign receivers on their own.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::detection::{Anomaly, AnomalyEngine};
use crate::df::{CalibrationReport, DfEngine};
use crate::events::{Event, EventSink};
use crate::hardware::{LeaseHandle, ResourceManager, Role};
use crate::mode::ModeState;
use crate::scanning::{EpochHandle, ScanEngine};
use crate::{CoreError, CoreResult};

pub struct ModeController {
    manager: Arc<ResourceManager>,
    scan: ScanEngine,
    df: DfEngine,
    anomalies: AnomalyEngine,
    sink: Arc<dyn EventSink>,
    config: EngineConfig,
    state: ModeState,
    epoch: Option<EpochHandle>,
    /// Trigger that arrived while a transition was in flight; last one wins.
    pending: Option<Anomaly>,
    last_df_frequency: Option<f64>,
    switch_count: u64,
}

impl ModeController {
    pub fn new(
        manager: Arc<ResourceManager>,
        sink: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> CoreResult<Self> {
        config.validate()?;
        let scan = ScanEngine::new(manager.clone(), sink.clone(), config.scan.clone());
        let df = DfEngine::new(config.df.clone());
        let anomalies = AnomalyEngine::new(config.anomaly.clone());
        Ok(Self {
            manager,
            scan,
            df,
            anomalies,
            sink,
            config,
            state: ModeState::ParallelScan,
            epoch: None,
            pending: None,
            last_df_frequency: None,
            switch_count: 0,
        })
    }

    pub fn state(&self) -> ModeState {
        self.state
    }

    pub fn switch_count(&self) -> u64 {
        self.switch_count
    }

    /// Start the first scan epoch.
    pub fn start(&mut self) {
        if self.epoch.is_none() {
            self.epoch = Some(self.scan.start_epoch(&self.config.bands));
        }
    }

    /// Drain queued scan samples through the anomaly engine, then service
    /// the strongest trigger found in the batch, if any cleared the bar.
    ///
    /// Waits for the first sample so callers can drive this in a plain loop;
    /// the rest of the batch is taken without blocking.
    pub async fn pump(&mut self) -> CoreResult<()> {
        let budget = self.config.controller.pump_budget;
        let mut strongest: Option<Anomaly> = None;
        let mut drained = 0usize;
        while drained < budget {
            let sample = {
                let epoch = match self.epoch.as_mut() {
                    Some(epoch) => epoch,
                    None => return Ok(()),
                };
                if drained == 0 {
                    match epoch.samples().recv().await {
                        Some(sample) => sample,
                        None => break,
                    }
                } else {
                    match epoch.samples().try_recv() {
                        Ok(sample) => sample,
                        Err(_) => break,
                    }
                }
            };
            drained += 1;
            if let Some(anomaly) = self.anomalies.observe(&sample) {
                self.sink.emit(&Event::Anomaly(anomaly.clone()));
                let stronger = strongest
                    .as_ref()
                    .map(|best| anomaly.priority_score > best.priority_score)
                    .unwrap_or(true);
                if stronger {
                    strongest = Some(anomaly);
                }
            }
        }
        if let Some(anomaly) = strongest {
            self.handle_trigger(anomaly).await?;
        }
        Ok(())
    }

    /// Entry point for a DF trigger. Below-threshold anomalies are ignored;
    /// a trigger landing mid-transition is parked and serviced afterwards.
    pub async fn handle_trigger(&mut self, anomaly: Anomaly) -> CoreResult<()> {
        if self.state != ModeState::ParallelScan {
            log::info!(
                "trigger at {:.3} MHz parked during {}",
                anomaly.frequency_hz / 1.0e6,
                self.state
            );
            self.pending = Some(anomaly);
            return Ok(());
        }
        if anomaly.priority_score < self.config.controller.trigger_threshold {
            return Ok(());
        }
        self.run_df_cycle(anomaly).await
    }

    async fn run_df_cycle(&mut self, anomaly: Anomaly) -> CoreResult<()> {
        let mut next = Some(anomaly);
        while let Some(anomaly) = next {
            self.df_once(anomaly.frequency_hz).await?;
            // parked triggers face the threshold again before another cycle
            next = self
                .pending
                .take()
                .filter(|parked| parked.priority_score >= self.config.controller.trigger_threshold);
        }
        Ok(())
    }

    #[cfg(test)]
    fn park_trigger(&mut self, anomaly: Anomaly) {
        self.pending = Some(anomaly);
    }

    /// One full scan -> array -> scan round trip.
    async fn df_once(&mut self, frequency_hz: f64) -> CoreResult<()> {
        self.set_state(ModeState::Transitioning);
        self.switch_count += 1;
        if let Some(epoch) = self.epoch.take() {
            self.scan.stop_epoch(epoch).await;
        }

        let mut leases = self.acquire_array();
        leases = self.tune_array(leases, frequency_hz);
        if leases.len() < 2 {
            log::warn!(
                "direction finding at {:.3} MHz aborted: {} usable element(s)",
                frequency_hz / 1.0e6,
                leases.len()
            );
            self.sink.emit(&Event::DfUnavailable {
                frequency_hz,
                available: leases.len(),
            });
            self.release_all(leases);
            self.resume_scan();
            return Ok(());
        }

        self.set_state(ModeState::DirectionFinding);
        let blocks = self.df.collect_blocks(&self.manager, &leases);
        let bearing = self.df.resolve_bearing(frequency_hz, &blocks);
        self.last_df_frequency = Some(frequency_hz);
        self.sink.emit(&Event::Bearing(bearing));

        self.release_all(leases);
        self.set_state(ModeState::Transitioning);
        self.resume_scan();
        Ok(())
    }

    /// Re-run phase calibration against an emitter at a known frequency,
    /// optionally at a known bearing. Borrows the whole pool like a DF cycle.
    pub async fn recalibrate(
        &mut self,
        frequency_hz: f64,
        known_bearing_deg: Option<f64>,
    ) -> CoreResult<CalibrationReport> {
        self.set_state(ModeState::Transitioning);
        if let Some(epoch) = self.epoch.take() {
            self.scan.stop_epoch(epoch).await;
        }
        let mut leases = self.acquire_array();
        leases = self.tune_array(leases, frequency_hz);
        if leases.len() < 2 {
            self.sink.emit(&Event::DfUnavailable {
                frequency_hz,
                available: leases.len(),
            });
            self.release_all(leases);
            self.resume_scan();
            return Err(CoreError::Sync("too few elements for calibration".into()));
        }
        let blocks = self.df.collect_blocks(&self.manager, &leases);
        let result = self
            .df
            .calibrate_from_blocks(&blocks, frequency_hz, known_bearing_deg);
        self.release_all(leases);
        self.resume_scan();
        let report = result?;
        self.sink.emit(&Event::Calibration(report.clone()));
        Ok(report)
    }

    /// Operator override of the automatic policy.
    pub async fn force_mode(&mut self, target: ModeState) -> CoreResult<()> {
        match target {
            ModeState::Transitioning => Err(CoreError::InvalidConfig(
                "transitioning cannot be forced".into(),
            )),
            ModeState::ParallelScan => {
                if let Some(epoch) = self.epoch.take() {
                    self.scan.stop_epoch(epoch).await;
                }
                self.resume_scan();
                Ok(())
            }
            ModeState::DirectionFinding => {
                let frequency = self
                    .pending
                    .take()
                    .map(|anomaly| anomaly.frequency_hz)
                    .or(self.last_df_frequency)
                    .ok_or_else(|| {
                        CoreError::Sync("no target frequency for direction finding".into())
                    })?;
                self.df_once(frequency).await
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(epoch) = self.epoch.take() {
            self.scan.stop_epoch(epoch).await;
        }
    }

    fn acquire_array(&self) -> Vec<LeaseHandle> {
        let wanted = self.df.config().geometry.elements.len();
        let mut leases = Vec::new();
        while leases.len() < wanted {
            match self.manager.acquire(Role::ArrayElement(leases.len())) {
                Ok(lease) => leases.push(lease),
                Err(_) => break,
            }
        }
        leases
    }

    /// Tune every element to the target; elements that fail drop out.
    fn tune_array(&self, leases: Vec<LeaseHandle>, frequency_hz: f64) -> Vec<LeaseHandle> {
        let gain = self.df.config().gain_db;
        let mut kept = Vec::with_capacity(leases.len());
        for lease in leases {
            match self.manager.tune(&lease, frequency_hz, gain) {
                Ok(()) => kept.push(lease),
                Err(err) => {
                    log::warn!("array element on unit {} dropped: {err}", lease.unit_id());
                    self.manager.release(lease);
                }
            }
        }
        kept
    }

    fn release_all(&self, leases: Vec<LeaseHandle>) {
        for lease in leases {
            self.manager.release(lease);
        }
    }

    fn resume_scan(&mut self) {
        self.epoch = Some(self.scan.start_epoch(&self.config.bands));
        self.set_state(ModeState::ParallelScan);
    }

    fn set_state(&mut self, to: ModeState) {
        if self.state == to {
            return;
        }
        log::info!("mode {} -> {}", self.state, to);
        self.sink.emit(&Event::ModeChanged {
            from: self.state,
            to,
        });
        self.state = to;
    }
}
